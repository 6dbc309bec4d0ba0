//! Feature vectorization
//!
//! Combines the categorical and numeric pipelines into one frozen transform:
//! encoded categoricals followed by scaled numerics, in schema order.

use crate::assembler::ItemTable;
use crate::encoder::CategoricalPipeline;
use crate::scaler::NumericPipeline;
use crate::schema::{FeatureKind, FeatureSchema};
use routewise_core::{Error, Result, Vector};

/// A fitted transform from an item table to per-row feature values
pub trait Transform {
    /// Output columns, in emission order
    fn columns(&self) -> Vec<&str>;

    /// One output row per table row, in table order
    fn transform(&self, table: &ItemTable) -> Result<Vec<Vec<f64>>>;

    fn output_dim(&self) -> usize {
        self.columns().len()
    }
}

/// Locate a column of the expected kind, or fail with a dimension mismatch
pub(crate) fn require_column(table: &ItemTable, name: &str, kind: FeatureKind) -> Result<usize> {
    table
        .column_index(name)
        .filter(|&idx| table.columns()[idx].kind == kind)
        .ok_or_else(|| Error::FeatureDimensionMismatch {
            expected: table.columns().len() + 1,
            actual: table.columns().len(),
        })
}

/// Both halves of the feature pipeline, applied together
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePipeline {
    categorical: CategoricalPipeline,
    numeric: NumericPipeline,
}

impl FeaturePipeline {
    pub fn new(categorical: CategoricalPipeline, numeric: NumericPipeline) -> Self {
        Self {
            categorical,
            numeric,
        }
    }

    pub fn fit(schema: &FeatureSchema, table: &ItemTable) -> Result<Self> {
        Ok(Self {
            categorical: CategoricalPipeline::fit(schema, table)?,
            numeric: NumericPipeline::fit(schema, table)?,
        })
    }

    pub fn categorical(&self) -> &CategoricalPipeline {
        &self.categorical
    }

    pub fn numeric(&self) -> &NumericPipeline {
        &self.numeric
    }

    pub fn dim(&self) -> usize {
        self.categorical.output_dim() + self.numeric.output_dim()
    }

    /// Check that the fitted pipelines match the frozen schema layout
    pub fn check_schema(&self, schema: &FeatureSchema) -> Result<()> {
        let mut columns = self.categorical.columns();
        columns.extend(self.numeric.columns());
        let expected = schema.vector_columns();
        if columns != expected {
            return Err(Error::FeatureDimensionMismatch {
                expected: expected.len(),
                actual: columns.len(),
            });
        }
        Ok(())
    }

    /// Vectorize every table row
    pub fn transform(&self, table: &ItemTable) -> Result<Vec<Vector>> {
        let categorical = self.categorical.transform(table)?;
        let numeric = self.numeric.transform(table)?;
        let dim = self.dim();

        let vectors: Vec<Vector> = categorical
            .into_iter()
            .zip(numeric)
            .map(|(c, n)| Vector::new(c.into_iter().chain(n).map(|v| v as f32).collect()))
            .collect();

        if let Some(bad) = vectors.iter().find(|v| v.dim() != dim) {
            return Err(Error::FeatureDimensionMismatch {
                expected: dim,
                actual: bad.dim(),
            });
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::FeatureAssembler;
    use crate::schema::FeatureColumn;
    use routewise_core::ItemRecord;

    fn training() -> (FeatureSchema, Vec<ItemRecord>) {
        let schema = FeatureSchema::new(vec![
            FeatureColumn::numeric("d"),
            FeatureColumn::categorical("mat"),
        ]);
        let records = vec![
            ItemRecord::new("A").with_attr("d", 10.0).with_attr("mat", "STS"),
            ItemRecord::new("B").with_attr("d", 20.0).with_attr("mat", "STS"),
        ];
        (schema, records)
    }

    #[test]
    fn test_layout_categoricals_then_numerics() {
        let (schema, records) = training();
        let table = FeatureAssembler::new(schema.clone()).assemble(&records).unwrap();
        let pipeline = FeaturePipeline::fit(&schema, &table).unwrap();
        pipeline.check_schema(&schema).unwrap();

        let vectors = pipeline.transform(&table).unwrap();
        assert_eq!(pipeline.dim(), 2);
        assert_eq!(vectors[0].as_slice(), &[1.0, -1.0]);
        assert_eq!(vectors[1].as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn test_same_item_bit_identical() {
        let (schema, records) = training();
        let assembler = FeatureAssembler::new(schema.clone());
        let table = assembler.assemble(&records).unwrap();
        let pipeline = FeaturePipeline::fit(&schema, &table).unwrap();

        let query = assembler.assemble([&records[0]]).unwrap();
        let v1 = pipeline.transform(&query).unwrap();
        let v2 = pipeline.transform(&query).unwrap();
        let bits = |v: &Vector| v.as_slice().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&v1[0]), bits(&v2[0]));
        assert_eq!(bits(&v1[0]), bits(&pipeline.transform(&table).unwrap()[0]));
    }

    #[test]
    fn test_check_schema_detects_drift() {
        let (schema, records) = training();
        let table = FeatureAssembler::new(schema.clone()).assemble(&records).unwrap();
        let pipeline = FeaturePipeline::fit(&schema, &table).unwrap();
        let drifted = FeatureSchema::new(vec![FeatureColumn::numeric("d")]);
        assert!(matches!(
            pipeline.check_schema(&drifted),
            Err(Error::FeatureDimensionMismatch { expected: 1, actual: 2 })
        ));
    }
}
