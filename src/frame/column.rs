//! Typed columns and column roles.
//!
//! Numeric data (numerical, discrete, time-stamp, target) is f64 with
//! NaN/±∞ as null. Categorical and join-key data is an interned id with
//! negative values as null. Text columns hold raw strings for the
//! text-aware variants.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The role a column plays inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    JoinKey,
    TimeStamp,
    Numerical,
    /// Integer-valued numeric data; takes the same aggregations as
    /// numerical columns but is enumerated as its own family.
    Discrete,
    Categorical,
    Text,
    Target,
    Unused,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::JoinKey => "join-key",
            Role::TimeStamp => "time-stamp",
            Role::Numerical => "numerical",
            Role::Discrete => "discrete",
            Role::Categorical => "categorical",
            Role::Text => "text",
            Role::Target => "target",
            Role::Unused => "unused",
        }
    }
}

/// Whether an f64 cell is null. NaN and ±∞ both denote missing data.
#[inline]
pub fn is_null(value: f64) -> bool {
    value.is_nan() || value.is_infinite()
}

/// A named f64 column. Cheap to clone (shared backing storage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatColumn {
    pub name: String,
    /// Free-form unit marker; two columns with the same non-empty unit are
    /// "same-unit" and may be compared across a join.
    pub unit: String,
    data: Arc<Vec<f64>>,
}

impl FloatColumn {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, data: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            data: Arc::new(data),
        }
    }

    #[inline]
    pub fn get(&self, row: usize) -> f64 {
        self.data[row]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// A named interned-id column (categoricals and join keys).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntColumn {
    pub name: String,
    pub unit: String,
    data: Arc<Vec<i64>>,
}

impl IntColumn {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, data: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            data: Arc::new(data),
        }
    }

    #[inline]
    pub fn get(&self, row: usize) -> i64 {
        self.data[row]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.data
    }
}

/// A named text column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextColumn {
    pub name: String,
    pub unit: String,
    data: Arc<Vec<String>>,
}

impl TextColumn {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, data: Vec<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            data: Arc::new(data),
        }
    }

    pub fn get(&self, row: usize) -> &str {
        &self.data[row]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Whether a unit marker restricts the column to same-unit comparisons.
///
/// Columns whose unit contains "comparison only" never appear as the
/// aggregated value of a free aggregation.
pub fn is_comparison_only(unit: &str) -> bool {
    unit.contains("comparison only")
}

/// Whether a column is a time stamp, by role first and unit substring as a
/// compatibility fallback for data ingested by older frontends.
pub fn is_time_stamp(role: Role, unit: &str) -> bool {
    role == Role::TimeStamp || unit.contains("time stamp")
}
