//! # Routewise Features
//!
//! Schema-driven feature construction for item-master rows.
//!
//! ## Overview
//!
//! Items arrive from the ERP as untyped attribute maps whose column names drift
//! between installations. This crate freezes a [`FeatureSchema`] at training
//! time and replays it at prediction time:
//!
//! 1. [`FeatureAssembler`] resolves each schema column (name or alias,
//!    case-insensitive) and produces a typed [`ItemTable`]
//! 2. [`CategoricalPipeline`] maps strings to integer codes with an unknown slot
//! 3. [`NumericPipeline`] imputes and standardizes numerics
//! 4. [`FeaturePipeline`] concatenates both into a [`routewise_core::Vector`]
//!
//! ## Example
//!
//! ```rust
//! use routewise_core::ItemRecord;
//! use routewise_features::{FeatureAssembler, FeatureColumn, FeaturePipeline, FeatureSchema};
//!
//! let schema = FeatureSchema::new(vec![
//!     FeatureColumn::categorical("mat"),
//!     FeatureColumn::numeric("d").with_aliases(&["OUTDIAMETER"]),
//! ]);
//! let records = vec![
//!     ItemRecord::new("A").with_attr("mat", "STS").with_attr("d", 10.0),
//!     ItemRecord::new("B").with_attr("mat", "STS").with_attr("OutDiameter", 20.0),
//! ];
//!
//! let assembler = FeatureAssembler::new(schema.clone());
//! let table = assembler.assemble(&records).unwrap();
//! let pipeline = FeaturePipeline::fit(&schema, &table).unwrap();
//! let vectors = pipeline.transform(&table).unwrap();
//! assert_eq!(vectors[0].dim(), 2);
//! ```
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ ItemRecord  │────>│  Assembler  │────>│  ItemTable  │
//! │ (attr map)  │     │ (aliases)   │     │  (typed)    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                          ┌─────────────────────┴───┐
//!                   ┌──────┴──────┐           ┌──────┴──────┐
//!                   │ Categorical │           │   Numeric   │
//!                   │  (codes)    │           │  (scaled)   │
//!                   └──────┬──────┘           └──────┬──────┘
//!                          └──────────┬──────────────┘
//!                              ┌──────┴──────┐
//!                              │   Vector    │
//!                              └─────────────┘
//! ```

pub mod assembler;
pub mod encoder;
pub mod pipeline;
pub mod scaler;
pub mod schema;

pub use assembler::{Cell, FeatureAssembler, ItemTable, RowView};
pub use encoder::{CategoricalPipeline, CategoryTable, UNKNOWN_CODE};
pub use pipeline::{FeaturePipeline, Transform};
pub use scaler::{ColumnStats, NumericPipeline, STD_EPSILON};
pub use schema::{FeatureColumn, FeatureKind, FeatureSchema};
