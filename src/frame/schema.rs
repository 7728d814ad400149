//! Frame schemas and column descriptions.
//!
//! A [`TableSchema`] is the column layout of a frame without its data:
//! names and units per column family. Schemas are extracted at fit time and
//! persisted so SQL generation and transform-time validation do not depend
//! on the original frames being around.

use serde::{Deserialize, Serialize};

use crate::frame::DataFrame;

/// Name + unit of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub unit: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
        }
    }
}

/// The column layout of one frame, grouped by family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub join_keys: Vec<ColumnMeta>,
    pub time_stamps: Vec<ColumnMeta>,
    pub categoricals: Vec<ColumnMeta>,
    pub discretes: Vec<ColumnMeta>,
    pub numericals: Vec<ColumnMeta>,
    pub targets: Vec<ColumnMeta>,
    pub texts: Vec<ColumnMeta>,
}

impl TableSchema {
    /// Extract the schema of a frame.
    pub fn of(df: &DataFrame) -> Self {
        let meta = |cols: &[crate::frame::FloatColumn]| -> Vec<ColumnMeta> {
            cols.iter()
                .map(|c| ColumnMeta::new(c.name.clone(), c.unit.clone()))
                .collect()
        };
        let meta_int = |cols: &[crate::frame::IntColumn]| -> Vec<ColumnMeta> {
            cols.iter()
                .map(|c| ColumnMeta::new(c.name.clone(), c.unit.clone()))
                .collect()
        };
        Self {
            name: df.name.clone(),
            join_keys: meta_int(df.join_keys()),
            time_stamps: meta(df.time_stamps()),
            categoricals: meta_int(df.categoricals()),
            discretes: meta(df.discretes()),
            numericals: meta(df.numericals()),
            targets: meta(df.targets()),
            texts: df
                .texts()
                .iter()
                .map(|c| ColumnMeta::new(c.name.clone(), c.unit.clone()))
                .collect(),
        }
    }
}

/// Which side of a join a described column lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSide {
    Population,
    Peripheral,
}

/// Identifies one column for the importance map: side, table, column name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub side: TableSide,
    pub table: String,
    pub column: String,
}

impl ColumnDescription {
    pub fn population(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            side: TableSide::Population,
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn peripheral(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            side: TableSide::Peripheral,
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match self.side {
            TableSide::Population => "population",
            TableSide::Peripheral => "peripheral",
        };
        write!(f, "{side}:{}.{}", self.table, self.column)
    }
}
