//! Columnar frames.
//!
//! A [`DataFrame`] is an ordered set of named, typed columns grouped by
//! family (join keys, time stamps, categoricals, discretes, numericals,
//! targets, text). All columns in a frame have equal length. Join-key
//! lookups are served by per-key-combination [`JoinKeyIndex`]es, built
//! lazily and cached on the frame.
//!
//! # Submodules
//! - `column` — typed columns and roles
//! - `encoding` — append-only interned string dictionaries
//! - `schema` — frame schemas and column descriptions
//! - `index` — join-key row indexes
//! - `view` — row-subset views

pub mod column;
pub mod encoding;
pub mod index;
pub mod schema;
pub mod view;

pub use column::{FloatColumn, IntColumn, Role, TextColumn, is_null};
pub use encoding::{NULL_ID, SharedEncoding, StringEncoding, shared_encoding};
pub use index::JoinKeyIndex;
pub use schema::{ColumnDescription, ColumnMeta, TableSchema, TableSide};
pub use view::DataFrameView;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{RelPropError, Result};

/// A columnar table with role-grouped columns of equal length.
#[derive(Debug, Default)]
pub struct DataFrame {
    pub name: String,
    nrows: Option<usize>,
    join_keys: Vec<IntColumn>,
    time_stamps: Vec<FloatColumn>,
    categoricals: Vec<IntColumn>,
    discretes: Vec<FloatColumn>,
    numericals: Vec<FloatColumn>,
    targets: Vec<FloatColumn>,
    texts: Vec<TextColumn>,
    /// Lazily built join-key indexes, keyed by the join-key column indices
    /// they cover. Built before worker threads spawn; read-only afterwards.
    index_cache: Mutex<HashMap<Vec<usize>, Arc<JoinKeyIndex>>>,
}

impl Clone for DataFrame {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            nrows: self.nrows,
            join_keys: self.join_keys.clone(),
            time_stamps: self.time_stamps.clone(),
            categoricals: self.categoricals.clone(),
            discretes: self.discretes.clone(),
            numericals: self.numericals.clone(),
            targets: self.targets.clone(),
            texts: self.texts.clone(),
            index_cache: Mutex::new(HashMap::new()),
        }
    }
}

impl DataFrame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Number of rows; 0 for a frame with no columns yet.
    pub fn nrows(&self) -> usize {
        self.nrows.unwrap_or(0)
    }

    fn check_len(&mut self, len: usize) -> Result<()> {
        match self.nrows {
            None => {
                self.nrows = Some(len);
                Ok(())
            }
            Some(n) if n == len => Ok(()),
            Some(_) => Err(RelPropError::RaggedFrame(self.name.clone())),
        }
    }

    // ── Column insertion ─────────────────────────────────────────────────

    pub fn add_join_key(&mut self, col: IntColumn) -> Result<()> {
        self.check_len(col.len())?;
        self.join_keys.push(col);
        Ok(())
    }

    pub fn add_time_stamp(&mut self, col: FloatColumn) -> Result<()> {
        self.check_len(col.len())?;
        self.time_stamps.push(col);
        Ok(())
    }

    pub fn add_categorical(&mut self, col: IntColumn) -> Result<()> {
        self.check_len(col.len())?;
        self.categoricals.push(col);
        Ok(())
    }

    pub fn add_discrete(&mut self, col: FloatColumn) -> Result<()> {
        self.check_len(col.len())?;
        self.discretes.push(col);
        Ok(())
    }

    pub fn add_numerical(&mut self, col: FloatColumn) -> Result<()> {
        self.check_len(col.len())?;
        self.numericals.push(col);
        Ok(())
    }

    pub fn add_target(&mut self, col: FloatColumn) -> Result<()> {
        self.check_len(col.len())?;
        self.targets.push(col);
        Ok(())
    }

    pub fn add_text(&mut self, col: TextColumn) -> Result<()> {
        self.check_len(col.len())?;
        self.texts.push(col);
        Ok(())
    }

    // ── Family accessors ─────────────────────────────────────────────────

    pub fn join_keys(&self) -> &[IntColumn] {
        &self.join_keys
    }

    pub fn time_stamps(&self) -> &[FloatColumn] {
        &self.time_stamps
    }

    pub fn categoricals(&self) -> &[IntColumn] {
        &self.categoricals
    }

    pub fn discretes(&self) -> &[FloatColumn] {
        &self.discretes
    }

    pub fn numericals(&self) -> &[FloatColumn] {
        &self.numericals
    }

    pub fn targets(&self) -> &[FloatColumn] {
        &self.targets
    }

    pub fn texts(&self) -> &[TextColumn] {
        &self.texts
    }

    // ── Lookups ──────────────────────────────────────────────────────────

    /// Find a join-key column index by name.
    pub fn find_join_key(&self, name: &str) -> Result<usize> {
        self.join_keys
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| RelPropError::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    /// Find a time-stamp column index by name.
    pub fn find_time_stamp(&self, name: &str) -> Result<usize> {
        self.time_stamps
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| RelPropError::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    /// Extract the frame's schema (names and units, no data).
    pub fn to_schema(&self) -> TableSchema {
        TableSchema::of(self)
    }

    /// The join-key index over the given join-key columns, building and
    /// caching it on first use.
    ///
    /// Index construction happens before the driver spawns workers, so the
    /// cache mutex never contends on the hot path.
    pub fn join_key_index(&self, jk_cols: &[usize]) -> Arc<JoinKeyIndex> {
        let mut cache = self.index_cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(idx) = cache.get(jk_cols) {
            return Arc::clone(idx);
        }
        let cols: Vec<&IntColumn> = jk_cols.iter().map(|&i| &self.join_keys[i]).collect();
        let idx = Arc::new(JoinKeyIndex::build(&cols));
        cache.insert(jk_cols.to_vec(), Arc::clone(&idx));
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        let mut df = DataFrame::new("orders");
        df.add_join_key(IntColumn::new("customer_id", "", vec![0, 1, 0]))
            .unwrap();
        df.add_numerical(FloatColumn::new("price", "dollars", vec![9.5, 3.0, 1.25]))
            .unwrap();
        df.add_time_stamp(FloatColumn::new("ordered_at", "", vec![1.0, 2.0, 3.0]))
            .unwrap();
        df
    }

    #[test]
    fn test_equal_length_enforced() {
        let mut df = sample_frame();
        let err = df.add_numerical(FloatColumn::new("short", "", vec![1.0]));
        assert!(matches!(err, Err(RelPropError::RaggedFrame(_))));
    }

    #[test]
    fn test_find_join_key() {
        let df = sample_frame();
        assert_eq!(df.find_join_key("customer_id").unwrap(), 0);
        assert!(df.find_join_key("nope").is_err());
    }

    #[test]
    fn test_index_is_cached() {
        let df = sample_frame();
        let a = df.join_key_index(&[0]);
        let b = df.join_key_index(&[0]);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_schema_extraction() {
        let schema = sample_frame().to_schema();
        assert_eq!(schema.name, "orders");
        assert_eq!(schema.join_keys.len(), 1);
        assert_eq!(schema.numericals[0].unit, "dollars");
        assert_eq!(schema.time_stamps[0].name, "ordered_at");
    }
}
