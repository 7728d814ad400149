//! Match enumeration.
//!
//! A [`Match`] links one population row to one peripheral row. The
//! matchmaker enumerates, for a given population row, the peripheral rows
//! sharing its (possibly composite) join key that also satisfy the edge's
//! temporal constraint. Enumeration is deterministic: for fixed inputs the
//! match list is identical across runs and thread counts.

use crate::engine::table_holder::TablePair;
use crate::frame::is_null;
use crate::hash::hash_composite_key;

/// A (population row, peripheral row) pair.
///
/// `ix_output` is the row index in the population *view* driving the build;
/// `ix_input` is the base row index in the peripheral frame. `value` caches
/// the value-to-be-aggregated for the current aggregation and `activated`
/// is flipped by the incremental state machines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub ix_output: u32,
    pub ix_input: u32,
    pub activated: bool,
    pub value: f64,
}

impl Match {
    pub fn new(ix_output: u32, ix_input: u32) -> Self {
        Self {
            ix_output,
            ix_input,
            activated: false,
            value: 0.0,
        }
    }
}

/// Append the matches for population view row `view_row` to `out`.
///
/// Join semantics:
/// - a null join-key component on the population side matches nothing;
/// - an empty join key is the degenerate all-rows join;
/// - with a temporal join, the peripheral time stamp must be non-null and
///   `peripheral_ts <= population_ts` (strict `<` when the edge allows
///   lagged targets), and `peripheral_ts < population_upper_ts` when an
///   upper time stamp is set.
pub fn make_matches(pair: &TablePair, view_row: usize, out: &mut Vec<Match>) {
    let base_row = pair.population.base_row(view_row);
    let pop_frame = pair.population.frame();

    if pair.pop_jk_cols.is_empty() {
        // Degenerate all-rows join.
        for ix_input in 0..pair.peripheral.nrows() {
            push_if_in_window(pair, view_row, base_row, ix_input as u32, out);
        }
        return;
    }

    let mut key = Vec::with_capacity(pair.pop_jk_cols.len());
    for &col in &pair.pop_jk_cols {
        let id = pop_frame.join_keys()[col].get(base_row);
        if id < 0 {
            return; // null key never matches
        }
        key.push(id);
    }

    for &ix_input in pair.index.rows(hash_composite_key(&key)) {
        // Hash buckets can collide; confirm the actual key values.
        let same_key = pair
            .peri_jk_cols
            .iter()
            .zip(key.iter())
            .all(|(&col, &id)| pair.peripheral.join_keys()[col].get(ix_input as usize) == id);
        if !same_key {
            continue;
        }
        push_if_in_window(pair, view_row, base_row, ix_input, out);
    }
}

#[inline]
fn push_if_in_window(
    pair: &TablePair,
    view_row: usize,
    base_row: usize,
    ix_input: u32,
    out: &mut Vec<Match>,
) {
    if let (Some(pop_col), Some(peri_col)) = (pair.pop_ts_col, pair.peri_ts_col) {
        let peri_ts = pair.peripheral.time_stamps()[peri_col].get(ix_input as usize);
        if is_null(peri_ts) {
            return; // null peripheral time stamp drops the match
        }

        let pop_ts = pair.population.frame().time_stamps()[pop_col].get(base_row);
        let in_past = if pair.allow_lagged_targets {
            peri_ts < pop_ts
        } else {
            peri_ts <= pop_ts
        };
        if !in_past {
            return;
        }

        if let Some(upper_col) = pair.pop_upper_ts_col {
            let upper = pair.population.frame().time_stamps()[upper_col].get(base_row);
            if !(peri_ts < upper) {
                return;
            }
        }
    }

    out.push(Match::new(view_row as u32, ix_input));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::table_holder::TableHolder;
    use crate::frame::{DataFrame, DataFrameView, FloatColumn, IntColumn};
    use crate::placeholder::SchemaTree;
    use std::sync::Arc;

    fn holder(
        pop_keys: Vec<i64>,
        pop_ts: Option<Vec<f64>>,
        peri_keys: Vec<i64>,
        peri_ts: Option<Vec<f64>>,
    ) -> TableHolder {
        let mut pop = DataFrame::new("population");
        pop.add_join_key(IntColumn::new("jk", "", pop_keys)).unwrap();
        if let Some(ts) = pop_ts {
            pop.add_time_stamp(FloatColumn::new("ts", "", ts)).unwrap();
        }

        let mut peri = DataFrame::new("orders");
        peri.add_join_key(IntColumn::new("jk", "", peri_keys)).unwrap();
        if let Some(ts) = peri_ts {
            peri.add_time_stamp(FloatColumn::new("ts", "", ts)).unwrap();
        }

        let temporal = !pop.time_stamps().is_empty() && !peri.time_stamps().is_empty();

        let mut tree = SchemaTree::new("population");
        tree.join(
            tree.root(),
            "orders",
            vec!["jk".into()],
            vec!["jk".into()],
            temporal.then(|| "ts".into()),
            temporal.then(|| "ts".into()),
            None,
            false,
        );

        TableHolder::new(
            &tree,
            DataFrameView::whole(Arc::new(pop)),
            &[Arc::new(peri)],
            &["orders".to_string()],
        )
        .unwrap()
    }

    fn matches_for(holder: &TableHolder, row: usize) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        make_matches(&holder.pairs[0], row, &mut out);
        out.iter().map(|m| (m.ix_output, m.ix_input)).collect()
    }

    #[test]
    fn test_plain_join_key_matching() {
        let h = holder(vec![0, 1], None, vec![0, 0, 0, 1], None);
        assert_eq!(matches_for(&h, 0), vec![(0, 0), (0, 1), (0, 2)]);
        assert_eq!(matches_for(&h, 1), vec![(1, 3)]);
    }

    #[test]
    fn test_null_population_key_matches_nothing() {
        let h = holder(vec![-1], None, vec![0, 1], None);
        assert_eq!(matches_for(&h, 0), vec![]);
    }

    #[test]
    fn test_temporal_filter() {
        // Population ts = 10; peripheral ts 3, 7, 9, 15 — 15 is in the future.
        let h = holder(
            vec![0],
            Some(vec![10.0]),
            vec![0, 0, 0, 0],
            Some(vec![3.0, 7.0, 9.0, 15.0]),
        );
        assert_eq!(matches_for(&h, 0), vec![(0, 0), (0, 1), (0, 2)]);
    }

    #[test]
    fn test_equal_time_stamp_included() {
        let h = holder(vec![0], Some(vec![10.0]), vec![0], Some(vec![10.0]));
        assert_eq!(matches_for(&h, 0), vec![(0, 0)]);
    }

    #[test]
    fn test_null_peripheral_time_stamp_dropped() {
        let h = holder(
            vec![0],
            Some(vec![10.0]),
            vec![0, 0],
            Some(vec![f64::NAN, 5.0]),
        );
        assert_eq!(matches_for(&h, 0), vec![(0, 1)]);
    }

    #[test]
    fn test_all_rows_join() {
        let mut pop = DataFrame::new("population");
        pop.add_join_key(IntColumn::new("jk", "", vec![0])).unwrap();

        let mut peri = DataFrame::new("orders");
        peri.add_join_key(IntColumn::new("jk", "", vec![5, 6, 7])).unwrap();

        let mut tree = SchemaTree::new("population");
        tree.join(
            tree.root(),
            "orders",
            vec![],
            vec![],
            None,
            None,
            None,
            false,
        );

        let h = TableHolder::new(
            &tree,
            DataFrameView::whole(Arc::new(pop)),
            &[Arc::new(peri)],
            &["orders".to_string()],
        )
        .unwrap();

        assert_eq!(matches_for(&h, 0), vec![(0, 0), (0, 1), (0, 2)]);
    }

    #[test]
    fn test_deterministic_enumeration() {
        let h = holder(vec![0, 1, 0], None, vec![1, 0, 0, 1, 0], None);
        for row in 0..3 {
            let a = matches_for(&h, row);
            let b = matches_for(&h, row);
            assert_eq!(a, b);
        }
        // Ascending peripheral order regardless of key layout.
        assert_eq!(matches_for(&h, 0), vec![(0, 1), (0, 2), (0, 4)]);
    }
}
