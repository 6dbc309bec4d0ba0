//! Feature schema definitions
//!
//! Declares which item-master attributes feed the feature vector, whether each
//! is categorical or numeric, and which alternative column names the live ERP
//! may use for it. The schema is frozen at training time and persisted in the
//! artifact bundle as `feature_columns`.

use routewise_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Feature schema version 1
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSchema {
    /// Schema version for future compatibility
    #[serde(default = "default_version")]
    pub version: u32,

    /// Configured columns, in declaration order
    pub columns: Vec<FeatureColumn>,
}

fn default_version() -> u32 {
    1
}

impl FeatureSchema {
    pub fn new(columns: Vec<FeatureColumn>) -> Self {
        Self {
            version: 1,
            columns,
        }
    }

    /// The item-master columns used by the standard ERP installation.
    pub fn erp_default() -> Self {
        Self::new(vec![
            FeatureColumn::categorical("ITEM_MATERIAL")
                .with_aliases(&["MATERIAL", "MATERIAL_KIND", "MAT"]),
            FeatureColumn::categorical("PART_TYPE").with_aliases(&["PARTTYPE", "ITEM_TYPE"]),
            FeatureColumn::categorical("SEAL_TYPE_GROUP")
                .with_aliases(&["SEAL_TYPE_GRUP", "SEALTYPE_GROUP"]),
            FeatureColumn::categorical("DRAW_NO").with_aliases(&["DRAWING_NO", "DRAWING_NUMBER"]),
            FeatureColumn::numeric("OUT_DIAMETER").with_aliases(&["OUTDIAMETER", "OD"]),
            FeatureColumn::numeric("IN_DIAMETER").with_aliases(&["INDIAMETER", "INNER_DIAMETER"]),
            FeatureColumn::numeric("THICKNESS").with_aliases(&["THK"]),
            FeatureColumn::numeric("ITEM_WEIGHT").with_aliases(&["WEIGHT", "NET_WEIGHT"]),
        ])
    }

    /// Reject empty schemas and duplicate (case-insensitive) column names
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::InvalidConfig("feature schema cannot be empty".into()));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(Error::InvalidConfig("feature column with empty name".into()));
            }
            if self.columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(Error::InvalidConfig(format!(
                    "duplicate feature column '{}'",
                    column.name
                )));
            }
        }
        Ok(())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Categorical columns in declaration order
    pub fn categorical_columns(&self) -> impl Iterator<Item = &FeatureColumn> {
        self.columns.iter().filter(|c| c.kind == FeatureKind::Categorical)
    }

    /// Numeric columns in declaration order
    pub fn numeric_columns(&self) -> impl Iterator<Item = &FeatureColumn> {
        self.columns.iter().filter(|c| c.kind == FeatureKind::Numeric)
    }

    /// Output vector layout: categoricals first, then numerics.
    pub fn vector_columns(&self) -> Vec<&str> {
        self.categorical_columns()
            .chain(self.numeric_columns())
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One configured feature column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureColumn {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: FeatureKind,

    /// Missing required columns fail assembly instead of taking the sentinel
    #[serde(default)]
    pub required: bool,

    /// Alternative source names, tried in order after `name`
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl FeatureColumn {
    pub fn categorical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FeatureKind::Categorical,
            required: false,
            aliases: Vec::new(),
        }
    }

    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FeatureKind::Numeric,
            required: false,
            aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    /// The column name followed by its aliases
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Categorical,
    Numeric,
}
