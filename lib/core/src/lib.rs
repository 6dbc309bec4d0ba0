//! # Routewise Core
//!
//! Core library for the Routewise routing recommender.
//!
//! This crate provides the shared data structures and the retrieval algorithm:
//!
//! - [`Error`] / [`ErrorKind`] / [`Recovery`] - the error taxonomy and its recovery table
//! - [`RecommendConfig`] - recommendation settings
//! - [`ItemRecord`] - an item-master row with untyped attributes
//! - [`RoutingRow`], [`WorkOrderRecord`], [`Operation`] - routing and shop-floor records
//! - [`Vector`] - dense feature vector
//! - [`SimilarityIndex`] - exact k-NN over L2-normalized rows
//!
//! ## Example
//!
//! ```rust
//! use routewise_core::{SimilarityIndex, Vector};
//!
//! let index = SimilarityIndex::build(
//!     vec![Vector::new(vec![1.0, 0.0]), Vector::new(vec![0.0, 1.0])],
//!     vec!["A".to_string(), "B".to_string()],
//! ).unwrap();
//!
//! let hits = index.search(&Vector::new(vec![1.0, 0.0]), 1, 0.0).unwrap();
//! assert_eq!(hits[0].item_code, "A");
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod item;
pub mod routing;
pub mod vector;

pub use config::{RecommendConfig, DEFAULT_HOLD_TIME_COLUMNS};
pub use error::{Error, ErrorKind, Recovery, Result};
pub use index::{SearchHit, SimilarityIndex};
pub use item::{normalize_item_code, AttrValue, ItemRecord};
pub use routing::{Operation, RoutingHistoryRow, RoutingRow, WorkOrderRecord};
pub use vector::Vector;
