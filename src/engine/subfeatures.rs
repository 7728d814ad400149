//! Subfeature composition.
//!
//! For every joined subtree, a child engine is fitted over (the joined
//! table as population, its own joined tables as peripherals). At
//! transform, the child runs once — not per row — restricted to the
//! peripheral rows actually reachable from the parent's selected rows, and
//! its output columns are exposed to the parent as additional inputs.
//!
//! The child only builds the columns the parent's feature index actually
//! references; [`SubfeatureOutput`] carries the row and column mappings
//! that line its compact matrix up with the parent's expectations.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::engine::matches::{self, Match};
use crate::engine::matrix::FeatureMatrix;
use crate::engine::table_holder::TablePair;

/// The materialized output of one child engine.
pub struct SubfeatureOutput {
    /// Sorted peripheral base rows the child built, matrix row `i`
    /// holding base row `rownums[i]`.
    pub rownums: Arc<Vec<usize>>,
    /// Child feature index → matrix column, `None` for columns the parent
    /// does not reference (pruned by selection).
    pub col_pos: Vec<Option<usize>>,
    pub matrix: FeatureMatrix,
}

impl SubfeatureOutput {
    /// The child's value for (peripheral base row, child feature index);
    /// NaN when the row was unreachable or the column was not built.
    #[inline]
    pub fn get(&self, base_row: usize, child_feature: usize) -> f64 {
        let row = match self.rownums.binary_search(&base_row) {
            Ok(row) => row,
            Err(_) => return f64::NAN,
        };
        match self.col_pos.get(child_feature).copied().flatten() {
            Some(col) => self.matrix.get(row, col),
            None => f64::NAN,
        }
    }
}

/// The sorted distinct child feature indices referenced by the parent's
/// feature index for one edge.
pub fn subfeature_index(
    features: &[crate::engine::feature::AbstractFeature],
    index: &[usize],
    peripheral: usize,
) -> Vec<usize> {
    let set: BTreeSet<usize> = index
        .iter()
        .map(|&ix| &features[ix])
        .filter(|f| {
            f.data_used == crate::engine::feature::DataUsed::Subfeatures
                && f.peripheral == peripheral
        })
        .map(|f| f.input_col)
        .collect();
    set.into_iter().collect()
}

/// Column mapping from child feature index to compact matrix column.
pub fn col_positions(subfeature_index: &[usize], num_child_features: usize) -> Vec<Option<usize>> {
    let mut col_pos = vec![None; num_child_features];
    for (col, &child_feature) in subfeature_index.iter().enumerate() {
        if child_feature < num_child_features {
            col_pos[child_feature] = Some(col);
        }
    }
    col_pos
}

/// The union of peripheral base rows reachable from the parent's view rows
/// through one edge, sorted ascending.
pub fn reachable_rows(pair: &TablePair, view_rows: usize) -> Vec<usize> {
    let mut unique: BTreeSet<usize> = BTreeSet::new();
    let mut buf: Vec<Match> = Vec::new();

    for view_row in 0..view_rows {
        buf.clear();
        matches::make_matches(pair, view_row, &mut buf);
        unique.extend(buf.iter().map(|m| m.ix_input as usize));
    }

    unique.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::feature::{AbstractFeature, AggKind, DataUsed};
    use crate::engine::table_holder::TableHolder;
    use crate::frame::{DataFrame, DataFrameView, IntColumn};
    use crate::placeholder::SchemaTree;

    #[test]
    fn test_subfeature_index_distinct_sorted() {
        let features = vec![
            AbstractFeature::new(AggKind::Sum, 0, DataUsed::Subfeatures, 2, vec![]),
            AbstractFeature::new(AggKind::Avg, 0, DataUsed::Subfeatures, 0, vec![]),
            AbstractFeature::new(AggKind::Max, 0, DataUsed::Subfeatures, 2, vec![]),
            AbstractFeature::new(AggKind::Sum, 0, DataUsed::Numerical, 1, vec![]),
            AbstractFeature::new(AggKind::Sum, 1, DataUsed::Subfeatures, 5, vec![]),
        ];
        let index: Vec<usize> = (0..features.len()).collect();
        assert_eq!(subfeature_index(&features, &index, 0), vec![0, 2]);
        assert_eq!(subfeature_index(&features, &index, 1), vec![5]);
        assert_eq!(subfeature_index(&features, &index, 2), Vec::<usize>::new());
    }

    #[test]
    fn test_col_positions() {
        let pos = col_positions(&[0, 2], 4);
        assert_eq!(pos, vec![Some(0), None, Some(1), None]);
    }

    #[test]
    fn test_reachable_rows_union() {
        let mut pop = DataFrame::new("population");
        pop.add_join_key(IntColumn::new("jk", "", vec![0, 1, 0])).unwrap();

        let mut peri = DataFrame::new("orders");
        peri.add_join_key(IntColumn::new("jk", "", vec![1, 0, 2, 0])).unwrap();

        let mut tree = SchemaTree::new("population");
        tree.join_on(0, "orders", "jk", "jk");

        let holder = TableHolder::new(
            &tree,
            DataFrameView::whole(Arc::new(pop)),
            &[Arc::new(peri)],
            &["orders".to_string()],
        )
        .unwrap();

        // Keys 0 and 1 are reachable; peripheral row 2 (key 2) is not.
        assert_eq!(reachable_rows(&holder.pairs[0], 3), vec![0, 1, 3]);
    }

    #[test]
    fn test_output_lookup() {
        let mut matrix = FeatureMatrix::new(2, 1, None).unwrap();
        matrix.set(0, 0, 2.0);
        matrix.set(1, 0, 4.0);

        let out = SubfeatureOutput {
            rownums: Arc::new(vec![3, 7]),
            col_pos: vec![None, Some(0)],
            matrix,
        };

        assert_eq!(out.get(3, 1), 2.0);
        assert_eq!(out.get(7, 1), 4.0);
        assert!(out.get(4, 1).is_nan(), "unreachable row is null");
        assert!(out.get(3, 0).is_nan(), "unbuilt column is null");
    }
}
