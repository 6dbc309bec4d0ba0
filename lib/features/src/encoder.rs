//! Categorical encoding
//!
//! One lookup table per categorical column. Codes start at 1 in sorted value
//! order; code 0 is the unknown slot shared by unseen values and the empty
//! missing sentinel.

use crate::assembler::{Cell, ItemTable};
use crate::pipeline::{require_column, Transform};
use crate::schema::{FeatureKind, FeatureSchema};
use ahash::AHashMap;
use routewise_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Code assigned to values not seen during fitting
pub const UNKNOWN_CODE: u32 = 0;

/// Lookup table for one categorical column
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "CategoryTableRepr", into = "CategoryTableRepr")]
pub struct CategoryTable {
    column: String,
    values: Vec<String>,
    lookup: AHashMap<String, u32>,
}

#[derive(Serialize, Deserialize)]
struct CategoryTableRepr {
    column: String,
    values: Vec<String>,
}

impl From<CategoryTableRepr> for CategoryTable {
    fn from(repr: CategoryTableRepr) -> Self {
        CategoryTable::from_sorted(repr.column, repr.values)
    }
}

impl From<CategoryTable> for CategoryTableRepr {
    fn from(table: CategoryTable) -> Self {
        CategoryTableRepr {
            column: table.column,
            values: table.values,
        }
    }
}

impl PartialEq for CategoryTable {
    fn eq(&self, other: &Self) -> bool {
        self.column == other.column && self.values == other.values
    }
}

impl CategoryTable {
    fn from_sorted(column: String, values: Vec<String>) -> Self {
        let lookup = values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i as u32 + 1))
            .collect();
        Self {
            column,
            values,
            lookup,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Number of known values (the unknown slot excluded)
    pub fn cardinality(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn encode(&self, value: &str) -> u32 {
        self.lookup.get(value).copied().unwrap_or(UNKNOWN_CODE)
    }

    /// `None` for the unknown slot and out-of-range codes
    #[inline]
    pub fn decode(&self, code: u32) -> Option<&str> {
        if code == UNKNOWN_CODE {
            return None;
        }
        self.values.get(code as usize - 1).map(String::as_str)
    }
}

/// Categorical half of the feature pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalPipeline {
    tables: Vec<CategoryTable>,
}

impl CategoricalPipeline {
    /// Learn the value tables from a training table
    pub fn fit(schema: &FeatureSchema, table: &ItemTable) -> Result<Self> {
        let mut tables = Vec::new();
        for column in schema.categorical_columns() {
            let col = require_column(table, &column.name, FeatureKind::Categorical)?;
            let distinct: BTreeSet<&str> = table
                .column_cells(col)
                .filter_map(|cell| match cell {
                    Cell::Text(s) if !s.is_empty() => Some(s.as_str()),
                    _ => None,
                })
                .collect();
            tables.push(CategoryTable::from_sorted(
                column.name.clone(),
                distinct.into_iter().map(str::to_string).collect(),
            ));
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[CategoryTable] {
        &self.tables
    }

    pub fn table(&self, column: &str) -> Option<&CategoryTable> {
        self.tables.iter().find(|t| t.column == column)
    }
}

impl Transform for CategoricalPipeline {
    fn columns(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.column.as_str()).collect()
    }

    fn transform(&self, table: &ItemTable) -> Result<Vec<Vec<f64>>> {
        let cols = self
            .tables
            .iter()
            .map(|t| require_column(table, &t.column, FeatureKind::Categorical))
            .collect::<Result<Vec<_>>>()?;

        Ok(table
            .rows()
            .map(|row| {
                self.tables
                    .iter()
                    .zip(&cols)
                    .map(|(t, &col)| match row.cell(col) {
                        Cell::Text(s) => t.encode(s) as f64,
                        Cell::Number(_) => UNKNOWN_CODE as f64,
                    })
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::FeatureAssembler;
    use crate::schema::FeatureColumn;
    use routewise_core::{Error, ItemRecord};

    fn fitted() -> (FeatureSchema, CategoricalPipeline) {
        let schema = FeatureSchema::new(vec![FeatureColumn::categorical("mat")]);
        let records = vec![
            ItemRecord::new("A").with_attr("mat", "STS"),
            ItemRecord::new("B").with_attr("mat", "AL"),
            ItemRecord::new("C").with_attr("mat", "STS"),
            ItemRecord::new("D"),
        ];
        let table = FeatureAssembler::new(schema.clone()).assemble(&records).unwrap();
        let pipeline = CategoricalPipeline::fit(&schema, &table).unwrap();
        (schema, pipeline)
    }

    #[test]
    fn test_codes_sorted_with_unknown_slot() {
        let (_, pipeline) = fitted();
        let table = pipeline.table("mat").unwrap();
        assert_eq!(table.cardinality(), 2);
        assert_eq!(table.encode("AL"), 1);
        assert_eq!(table.encode("STS"), 2);
        assert_eq!(table.encode(""), UNKNOWN_CODE);
        assert_eq!(table.encode("CU"), UNKNOWN_CODE);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let (_, pipeline) = fitted();
        let table = pipeline.table("mat").unwrap();
        for value in ["AL", "STS"] {
            assert_eq!(table.decode(table.encode(value)), Some(value));
        }
        assert_eq!(table.decode(table.encode("UNSEEN")), None);
        assert_eq!(table.decode(UNKNOWN_CODE), None);
        assert_eq!(table.decode(99), None);
    }

    #[test]
    fn test_transform_emits_codes_as_reals() {
        let (schema, pipeline) = fitted();
        let query = ItemRecord::new("Q").with_attr("mat", "STS");
        let table = FeatureAssembler::new(schema).assemble([&query]).unwrap();
        assert_eq!(pipeline.transform(&table).unwrap(), vec![vec![2.0]]);
    }

    #[test]
    fn test_transform_requires_columns() {
        let (_, pipeline) = fitted();
        let other = FeatureSchema::new(vec![FeatureColumn::numeric("d")]);
        let table = FeatureAssembler::new(other)
            .assemble([&ItemRecord::new("Q")])
            .unwrap();
        assert!(matches!(
            pipeline.transform(&table),
            Err(Error::FeatureDimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_lookup_rebuilt_after_deserialize() {
        let (_, pipeline) = fitted();
        let bytes = bincode::serialize(&pipeline).unwrap();
        let restored: CategoricalPipeline = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, pipeline);
        assert_eq!(restored.table("mat").unwrap().encode("STS"), 2);
    }
}
