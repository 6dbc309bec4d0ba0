//! Feature assembly
//!
//! Turns item-master records into a schema-shaped table: one row per item, one
//! cell per configured column, in schema order. Pure; never touches the database.

use crate::schema::{FeatureColumn, FeatureKind, FeatureSchema};
use routewise_core::{AttrValue, Error, ItemRecord, Result};
use tracing::warn;

/// A typed cell. Missing values carry the sentinel for their kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Categorical value; empty string is the missing sentinel
    Text(String),
    /// Numeric value; NaN is the missing sentinel
    Number(f64),
}

impl Cell {
    fn missing(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::Categorical => Cell::Text(String::new()),
            FeatureKind::Numeric => Cell::Number(f64::NAN),
        }
    }

    fn from_value(kind: FeatureKind, value: &AttrValue) -> Self {
        match kind {
            FeatureKind::Categorical => Cell::Text(value.as_text().unwrap_or_default()),
            FeatureKind::Numeric => Cell::Number(value.as_number().unwrap_or(f64::NAN)),
        }
    }
}

/// Schema-shaped item table
#[derive(Debug, Clone)]
pub struct ItemTable {
    columns: Vec<FeatureColumn>,
    item_codes: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl ItemTable {
    pub fn new(columns: Vec<FeatureColumn>) -> Self {
        Self {
            columns,
            item_codes: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Append a row; the cell count must match the column count
    pub fn push_row(&mut self, item_code: String, cells: Vec<Cell>) -> Result<()> {
        if cells.len() != self.columns.len() {
            return Err(Error::FeatureDimensionMismatch {
                expected: self.columns.len(),
                actual: cells.len(),
            });
        }
        self.item_codes.push(item_code);
        self.rows.push(cells);
        Ok(())
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn item_codes(&self) -> &[String] {
        &self.item_codes
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, idx: usize) -> RowView<'_> {
        RowView { table: self, idx }
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        (0..self.rows.len()).map(move |idx| RowView { table: self, idx })
    }

    /// Raw cells of a column across all rows
    pub fn column_cells(&self, col: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().map(move |row| &row[col])
    }
}

/// Borrowed view of one table row with typed accessors by column name
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a ItemTable,
    idx: usize,
}

impl<'a> RowView<'a> {
    pub fn item_code(&self) -> &'a str {
        &self.table.item_codes[self.idx]
    }

    pub fn cell(&self, col: usize) -> &'a Cell {
        &self.table.rows[self.idx][col]
    }

    /// Categorical value; `None` when the column is absent or not categorical
    pub fn text(&self, column: &str) -> Option<&'a str> {
        match self.cell(self.table.column_index(column)?) {
            Cell::Text(s) => Some(s.as_str()),
            Cell::Number(_) => None,
        }
    }

    /// Numeric value (NaN when missing); `None` when the column is absent or not numeric
    pub fn number(&self, column: &str) -> Option<f64> {
        match self.cell(self.table.column_index(column)?) {
            Cell::Number(n) => Some(*n),
            Cell::Text(_) => None,
        }
    }
}

/// Builds [`ItemTable`]s from item records according to a frozen schema
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    schema: FeatureSchema,
}

impl FeatureAssembler {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Find the source value for a column: its own name first, then each alias,
    /// compared case-insensitively. The first name present on the record wins.
    pub fn resolve<'r>(&self, column: &FeatureColumn, record: &'r ItemRecord) -> Option<&'r AttrValue> {
        column
            .source_names()
            .find_map(|name| record.get_ci(name).map(|(_, value)| value))
    }

    /// Assemble the cells of one record
    pub fn assemble_row(&self, record: &ItemRecord) -> Result<Vec<Cell>> {
        self.schema
            .columns
            .iter()
            .map(|column| match self.resolve(column, record) {
                Some(value) => Ok(Cell::from_value(column.kind, value)),
                None if column.required => Err(Error::SchemaMismatch {
                    item_code: record.item_code.clone(),
                    column: column.name.clone(),
                }),
                None => Ok(Cell::missing(column.kind)),
            })
            .collect()
    }

    /// Assemble all records; the first unresolvable required column fails the table.
    pub fn assemble<'r, I>(&self, records: I) -> Result<ItemTable>
    where
        I: IntoIterator<Item = &'r ItemRecord>,
    {
        let mut table = ItemTable::new(self.schema.columns.clone());
        for record in records {
            let cells = self.assemble_row(record)?;
            table.push_row(normalize_code(&record.item_code), cells)?;
        }
        Ok(table)
    }

    /// Assemble all records, skipping (and returning) the ones that fail.
    pub fn assemble_lenient<'r, I>(&self, records: I) -> (ItemTable, Vec<Error>)
    where
        I: IntoIterator<Item = &'r ItemRecord>,
    {
        let mut table = ItemTable::new(self.schema.columns.clone());
        let mut rejected = Vec::new();
        for record in records {
            match self
                .assemble_row(record)
                .and_then(|cells| table.push_row(normalize_code(&record.item_code), cells))
            {
                Ok(()) => {}
                Err(e) => {
                    warn!(item_code = %record.item_code, error = %e, "item rejected by feature assembly");
                    rejected.push(e);
                }
            }
        }
        (table, rejected)
    }
}

#[inline]
fn normalize_code(code: &str) -> String {
    routewise_core::normalize_item_code(code)
}
