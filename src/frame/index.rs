//! Join-key row indexes.
//!
//! Each peripheral frame is pre-indexed: a hash from (possibly composite)
//! join-key value to the sorted list of row indices sharing that key. Rows
//! with a null component in their key are excluded — a null key never
//! matches anything.

use std::collections::HashMap;

use crate::frame::column::IntColumn;
use crate::hash::hash_composite_key;

/// Index from hashed join-key value to sorted row indices.
#[derive(Debug, Default, Clone)]
pub struct JoinKeyIndex {
    map: HashMap<u64, Vec<u32>>,
}

impl JoinKeyIndex {
    /// Build the index over one or more join-key columns.
    ///
    /// All columns must have equal length (enforced by the owning frame).
    /// With an empty column list the index stays empty; the degenerate
    /// all-rows join is handled by the matchmaker, not here.
    pub fn build(cols: &[&IntColumn]) -> Self {
        let mut map: HashMap<u64, Vec<u32>> = HashMap::new();

        if cols.is_empty() {
            return Self { map };
        }

        let nrows = cols[0].len();
        let mut key_buf = vec![0i64; cols.len()];

        'rows: for row in 0..nrows {
            for (slot, col) in key_buf.iter_mut().zip(cols.iter()) {
                let id = col.get(row);
                if id < 0 {
                    continue 'rows; // null key component: row is unreachable
                }
                *slot = id;
            }
            map.entry(hash_composite_key(&key_buf))
                .or_default()
                .push(row as u32);
        }

        // Insertion order is already ascending per key, but make the
        // contract explicit for deterministic enumeration.
        for rows in map.values_mut() {
            rows.sort_unstable();
        }

        Self { map }
    }

    /// Rows sharing the given hashed key, in ascending order.
    pub fn rows(&self, key_hash: u64) -> &[u32] {
        self.map.get(&key_hash).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_keys(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_key_index() {
        let col = IntColumn::new("jk", "", vec![0, 1, 0, 0, 1]);
        let idx = JoinKeyIndex::build(&[&col]);

        assert_eq!(idx.num_keys(), 2);
        assert_eq!(idx.rows(hash_composite_key(&[0])), &[0, 2, 3]);
        assert_eq!(idx.rows(hash_composite_key(&[1])), &[1, 4]);
        assert_eq!(idx.rows(hash_composite_key(&[99])), &[] as &[u32]);
    }

    #[test]
    fn test_null_keys_excluded() {
        let col = IntColumn::new("jk", "", vec![0, -1, 0]);
        let idx = JoinKeyIndex::build(&[&col]);
        assert_eq!(idx.rows(hash_composite_key(&[0])), &[0, 2]);
        assert_eq!(idx.num_keys(), 1);
    }

    #[test]
    fn test_composite_key_index() {
        let a = IntColumn::new("a", "", vec![0, 0, 1, 0]);
        let b = IntColumn::new("b", "", vec![5, 6, 5, 5]);
        let idx = JoinKeyIndex::build(&[&a, &b]);

        assert_eq!(idx.rows(hash_composite_key(&[0, 5])), &[0, 3]);
        assert_eq!(idx.rows(hash_composite_key(&[0, 6])), &[1]);
        assert_eq!(idx.rows(hash_composite_key(&[1, 5])), &[2]);
    }

    #[test]
    fn test_composite_null_component_excluded() {
        let a = IntColumn::new("a", "", vec![0, 0]);
        let b = IntColumn::new("b", "", vec![5, -1]);
        let idx = JoinKeyIndex::build(&[&a, &b]);
        assert_eq!(idx.rows(hash_composite_key(&[0, 5])), &[0]);
    }
}
