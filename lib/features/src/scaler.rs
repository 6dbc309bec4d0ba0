//! Numeric scaling
//!
//! Per-column mean and population standard deviation learned at training time.
//! Missing values are imputed with the stored mean before standardization.

use crate::assembler::{Cell, ItemTable};
use crate::pipeline::{require_column, Transform};
use crate::schema::{FeatureKind, FeatureSchema};
use routewise_core::Result;
use serde::{Deserialize, Serialize};

/// Floor for the standard deviation divisor
pub const STD_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: String,
    pub mean: f64,
    pub std: f64,
}

impl ColumnStats {
    #[inline]
    pub fn scale(&self, value: f64) -> f64 {
        let value = if value.is_finite() { value } else { self.mean };
        (value - self.mean) / self.std.max(STD_EPSILON)
    }
}

/// Numeric half of the feature pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericPipeline {
    stats: Vec<ColumnStats>,
}

impl NumericPipeline {
    /// Learn mean/stddev over the finite values of each numeric column.
    /// A column with no finite values gets mean 0 and stddev 0.
    pub fn fit(schema: &FeatureSchema, table: &ItemTable) -> Result<Self> {
        let mut stats = Vec::new();
        for column in schema.numeric_columns() {
            let col = require_column(table, &column.name, FeatureKind::Numeric)?;
            let values: Vec<f64> = table
                .column_cells(col)
                .filter_map(|cell| match cell {
                    Cell::Number(n) if n.is_finite() => Some(*n),
                    _ => None,
                })
                .collect();
            let (mean, std) = mean_and_std(&values);
            stats.push(ColumnStats {
                column: column.name.clone(),
                mean,
                std,
            });
        }
        Ok(Self { stats })
    }

    pub fn stats(&self) -> &[ColumnStats] {
        &self.stats
    }
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl Transform for NumericPipeline {
    fn columns(&self) -> Vec<&str> {
        self.stats.iter().map(|s| s.column.as_str()).collect()
    }

    fn transform(&self, table: &ItemTable) -> Result<Vec<Vec<f64>>> {
        let cols = self
            .stats
            .iter()
            .map(|s| require_column(table, &s.column, FeatureKind::Numeric))
            .collect::<Result<Vec<_>>>()?;

        Ok(table
            .rows()
            .map(|row| {
                self.stats
                    .iter()
                    .zip(&cols)
                    .map(|(s, &col)| match row.cell(col) {
                        Cell::Number(n) => s.scale(*n),
                        Cell::Text(_) => s.scale(f64::NAN),
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
    use routewise_core::ItemRecord;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![FeatureColumn::numeric("d"), FeatureColumn::numeric("w")])
    }

    fn fitted() -> NumericPipeline {
        let records = vec![
            ItemRecord::new("A").with_attr("d", 10.0).with_attr("w", 5.0),
            ItemRecord::new("B").with_attr("d", 20.0).with_attr("w", 5.0),
            ItemRecord::new("C").with_attr("d", "bad"),
        ];
        let table = FeatureAssembler::new(schema()).assemble(&records).unwrap();
        NumericPipeline::fit(&schema(), &table).unwrap()
    }

    #[test]
    fn test_fit_ignores_missing() {
        let pipeline = fitted();
        let d = &pipeline.stats()[0];
        assert!((d.mean - 15.0).abs() < 1e-12);
        assert!((d.std - 5.0).abs() < 1e-12);
        let w = &pipeline.stats()[1];
        assert!((w.mean - 5.0).abs() < 1e-12);
        assert_eq!(w.std, 0.0);
    }

    #[test]
    fn test_missing_imputed_with_mean() {
        let pipeline = fitted();
        let table = FeatureAssembler::new(schema())
            .assemble([&ItemRecord::new("Q")])
            .unwrap();
        assert_eq!(pipeline.transform(&table).unwrap(), vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn test_standardization() {
        let pipeline = fitted();
        let query = ItemRecord::new("Q").with_attr("d", 25.0).with_attr("w", 5.0);
        let table = FeatureAssembler::new(schema()).assemble([&query]).unwrap();
        let out = pipeline.transform(&table).unwrap();
        assert!((out[0][0] - 2.0).abs() < 1e-12);
        assert_eq!(out[0][1], 0.0);
    }

    #[test]
    fn test_zero_std_uses_epsilon() {
        let stats = ColumnStats {
            column: "w".into(),
            mean: 0.0,
            std: 0.0,
        };
        assert!((stats.scale(1e-12) - 1.0).abs() < 1e-9);
        assert_eq!(stats.scale(0.0), 0.0);
    }
}
