//! Error types for relprop.
//!
//! All failures inside the engine are represented by [`RelPropError`] and
//! propagated via `Result<T, RelPropError>`. No panics are used for control
//! flow; worker threads convert their first error into the surface error at
//! the driver join point.
//!
//! # Error Classification
//!
//! Errors are classified into five categories:
//! - **Schema** — the schema tree references a column that does not exist,
//!   or one with an incompatible role. Fatal.
//! - **Config** — inconsistent hyperparameters. Fatal.
//! - **NotFitted** — transform or SQL emission before fit. Fatal.
//! - **Cancelled** — a cooperative cancellation was observed. Surfaced so
//!   the caller can distinguish it from a real failure.
//! - **Internal** — bugs.
//!
//! Numeric anomalies (NaN/±∞ in aggregated values) are *not* errors: nulls
//! are partitioned out before activation and any residual non-finite cell is
//! projected to 0.0 at the final write.

use std::fmt;

/// Primary error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum RelPropError {
    // ── Schema errors ────────────────────────────────────────────────────
    /// The schema tree references a table that was not supplied.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The schema tree references a column that does not exist.
    #[error("column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },

    /// A column was used with an incompatible role (e.g. a non-time-stamp
    /// column declared as the temporal join key).
    #[error("role mismatch for {table}.{column}: expected {expected}, found {found}")]
    RoleMismatch {
        table: String,
        column: String,
        expected: String,
        found: String,
    },

    /// Two columns in the same frame have different lengths.
    #[error("ragged frame {0}: column lengths differ")]
    RaggedFrame(String),

    // ── Configuration errors ─────────────────────────────────────────────
    /// Inconsistent or out-of-range hyperparameters.
    #[error("invalid hyperparameters: {0}")]
    InvalidHyperparameters(String),

    /// The population frame contains no rows.
    #[error("population table needs to contain at least some data")]
    EmptyPopulation,

    /// The number of supplied peripheral tables does not match the number of
    /// peripheral names the engine was constructed with.
    #[error("expected {expected} peripheral tables, got {got}")]
    PeripheralCountMismatch { expected: usize, got: usize },

    // ── Lifecycle errors ─────────────────────────────────────────────────
    /// Transform or SQL emission was attempted before fit.
    #[error("engine has not been fitted: {0}")]
    NotFitted(String),

    // ── Cancellation ─────────────────────────────────────────────────────
    /// The cooperative cancel flag was raised during fit or transform.
    #[error("operation cancelled")]
    Cancelled,

    // ── Persistence errors ───────────────────────────────────────────────
    /// A fitted engine could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    // ── Internal errors — should not happen ──────────────────────────────
    /// An unexpected internal error. Indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Classification of error severity/kind for callers and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelPropErrorKind {
    Schema,
    Config,
    NotFitted,
    Cancelled,
    Internal,
}

impl fmt::Display for RelPropErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelPropErrorKind::Schema => write!(f, "SCHEMA"),
            RelPropErrorKind::Config => write!(f, "CONFIG"),
            RelPropErrorKind::NotFitted => write!(f, "NOT_FITTED"),
            RelPropErrorKind::Cancelled => write!(f, "CANCELLED"),
            RelPropErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl RelPropError {
    /// Classify the error for logging and caller-side handling.
    pub fn kind(&self) -> RelPropErrorKind {
        match self {
            RelPropError::TableNotFound(_)
            | RelPropError::ColumnNotFound { .. }
            | RelPropError::RoleMismatch { .. }
            | RelPropError::RaggedFrame(_) => RelPropErrorKind::Schema,

            RelPropError::InvalidHyperparameters(_)
            | RelPropError::EmptyPopulation
            | RelPropError::PeripheralCountMismatch { .. } => RelPropErrorKind::Config,

            RelPropError::NotFitted(_) => RelPropErrorKind::NotFitted,

            RelPropError::Cancelled => RelPropErrorKind::Cancelled,

            RelPropError::Serialization(_) | RelPropError::Internal(_) => RelPropErrorKind::Internal,
        }
    }

    /// Whether the error was a cooperative cancellation rather than a
    /// genuine failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelPropError::Cancelled)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RelPropError>;
