//! Per-join-edge table pairs.
//!
//! A [`TableHolder`] resolves the schema tree's root-level edges against
//! the actual frames once per fit/transform: for each edge it pins the
//! population view, the peripheral frame, the join-key/time-stamp column
//! indices on both sides, and the peripheral's join-key index.
//!
//! All resolution errors (missing columns, missing tables) surface here,
//! before any worker thread spawns.

use std::sync::Arc;

use crate::error::{RelPropError, Result};
use crate::frame::{DataFrame, DataFrameView, FloatColumn, JoinKeyIndex};
use crate::placeholder::{JoinEdge, SchemaTree};

/// One resolved join edge: the parent view paired with a peripheral frame.
#[derive(Clone)]
pub struct TablePair {
    /// The parent (population) side, possibly row-restricted.
    pub population: DataFrameView,
    /// The peripheral frame. When the edge allows lagged targets, this is
    /// the augmented frame with targets appended to the numericals.
    pub peripheral: Arc<DataFrame>,
    /// Index of the peripheral within the caller's peripheral list.
    pub peripheral_ix: usize,
    /// Join-key column indices on the population side.
    pub pop_jk_cols: Vec<usize>,
    /// Join-key column indices on the peripheral side.
    pub peri_jk_cols: Vec<usize>,
    /// Population-side time-stamp column, when the join is temporal.
    pub pop_ts_col: Option<usize>,
    /// Peripheral-side time-stamp column, when the join is temporal.
    pub peri_ts_col: Option<usize>,
    /// Population-side upper time stamp: a match requires
    /// `peripheral_ts < population_upper_ts`.
    pub pop_upper_ts_col: Option<usize>,
    /// Whether lagged peripheral targets are exposed as inputs.
    pub allow_lagged_targets: bool,
    /// Join-key index over `peri_jk_cols`.
    pub index: Arc<JoinKeyIndex>,
}

impl TablePair {
    /// The peripheral table's name.
    pub fn peripheral_name(&self) -> &str {
        &self.peripheral.name
    }
}

/// All resolved root-level edges of a schema tree.
pub struct TableHolder {
    pub pairs: Vec<TablePair>,
}

impl TableHolder {
    /// Resolve the root edges of `tree` against the population view and the
    /// peripheral frames.
    pub fn new(
        tree: &SchemaTree,
        population: DataFrameView,
        peripherals: &[Arc<DataFrame>],
        peripheral_names: &[String],
    ) -> Result<Self> {
        let root = tree.node(tree.root());
        let mut pairs = Vec::with_capacity(root.children.len());

        for edge in &root.children {
            let child_table = &tree.node(edge.child).table;
            let peripheral_ix = find_peripheral_ix(peripheral_names, child_table)?;
            if peripheral_ix >= peripherals.len() {
                return Err(RelPropError::PeripheralCountMismatch {
                    expected: peripheral_names.len(),
                    got: peripherals.len(),
                });
            }
            let peripheral = &peripherals[peripheral_ix];

            pairs.push(resolve_edge(
                edge,
                population.clone(),
                peripheral,
                peripheral_ix,
            )?);
        }

        Ok(Self { pairs })
    }
}

/// Find the index of a peripheral name.
pub fn find_peripheral_ix(peripheral_names: &[String], name: &str) -> Result<usize> {
    peripheral_names
        .iter()
        .position(|n| n == name)
        .ok_or_else(|| RelPropError::TableNotFound(name.to_string()))
}

fn resolve_edge(
    edge: &JoinEdge,
    population: DataFrameView,
    peripheral: &Arc<DataFrame>,
    peripheral_ix: usize,
) -> Result<TablePair> {
    let pop_frame = population.frame();

    let pop_jk_cols = edge
        .join_key
        .iter()
        .map(|name| pop_frame.find_join_key(name))
        .collect::<Result<Vec<_>>>()?;

    let peri_jk_cols = edge
        .other_join_key
        .iter()
        .map(|name| peripheral.find_join_key(name))
        .collect::<Result<Vec<_>>>()?;

    let pop_ts_col = edge
        .time_stamp
        .as_deref()
        .map(|name| pop_frame.find_time_stamp(name))
        .transpose()?;

    let peri_ts_col = edge
        .other_time_stamp
        .as_deref()
        .map(|name| peripheral.find_time_stamp(name))
        .transpose()?;

    let pop_upper_ts_col = edge
        .upper_time_stamp
        .as_deref()
        .map(|name| pop_frame.find_time_stamp(name))
        .transpose()?;

    // Lagged targets become ordinary numerical inputs on the peripheral
    // side. The matchmaker tightens the temporal predicate to strict
    // precedence for such edges, so no contemporaneous target can leak.
    let peripheral = if edge.allow_lagged_targets && !peripheral.targets().is_empty() {
        Arc::new(augment_with_targets(peripheral))
    } else {
        Arc::clone(peripheral)
    };

    let index = peripheral.join_key_index(&peri_jk_cols);

    Ok(TablePair {
        population,
        peripheral,
        peripheral_ix,
        pop_jk_cols,
        peri_jk_cols,
        pop_ts_col,
        peri_ts_col,
        pop_upper_ts_col,
        allow_lagged_targets: edge.allow_lagged_targets,
        index,
    })
}

/// Clone a frame with its target columns appended to the numericals.
fn augment_with_targets(df: &DataFrame) -> DataFrame {
    let mut out = df.clone();
    for target in df.targets() {
        let col = FloatColumn::new(
            target.name.clone(),
            target.unit.clone(),
            target.as_slice().to_vec(),
        );
        // Lengths match by construction; the error arm is unreachable.
        let _ = out.add_numerical(col);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::IntColumn;

    fn population() -> Arc<DataFrame> {
        let mut df = DataFrame::new("population");
        df.add_join_key(IntColumn::new("jk", "", vec![0, 1])).unwrap();
        df.add_time_stamp(FloatColumn::new("ts", "", vec![10.0, 20.0]))
            .unwrap();
        Arc::new(df)
    }

    fn peripheral() -> Arc<DataFrame> {
        let mut df = DataFrame::new("orders");
        df.add_join_key(IntColumn::new("jk", "", vec![0, 0, 1])).unwrap();
        df.add_time_stamp(FloatColumn::new("ts", "", vec![1.0, 2.0, 3.0]))
            .unwrap();
        df.add_target(FloatColumn::new("y", "", vec![0.0, 1.0, 0.0]))
            .unwrap();
        Arc::new(df)
    }

    fn tree(temporal: bool, lagged: bool) -> SchemaTree {
        let mut tree = SchemaTree::new("population");
        tree.join(
            tree.root(),
            "orders",
            vec!["jk".into()],
            vec!["jk".into()],
            temporal.then(|| "ts".into()),
            temporal.then(|| "ts".into()),
            None,
            lagged,
        );
        tree
    }

    #[test]
    fn test_resolves_columns() {
        let pop = population();
        let peri = peripheral();
        let holder = TableHolder::new(
            &tree(true, false),
            DataFrameView::whole(Arc::clone(&pop)),
            &[Arc::clone(&peri)],
            &["orders".to_string()],
        )
        .unwrap();

        assert_eq!(holder.pairs.len(), 1);
        let pair = &holder.pairs[0];
        assert_eq!(pair.pop_jk_cols, vec![0]);
        assert_eq!(pair.peri_jk_cols, vec![0]);
        assert_eq!(pair.pop_ts_col, Some(0));
        assert_eq!(pair.peri_ts_col, Some(0));
        assert_eq!(pair.peripheral.numericals().len(), 0);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let mut bad = SchemaTree::new("population");
        bad.join_on(0, "orders", "missing", "jk");
        let err = TableHolder::new(
            &bad,
            DataFrameView::whole(population()),
            &[peripheral()],
            &["orders".to_string()],
        );
        assert!(matches!(err, Err(RelPropError::ColumnNotFound { .. })));
    }

    #[test]
    fn test_lagged_targets_augment_numericals() {
        let holder = TableHolder::new(
            &tree(true, true),
            DataFrameView::whole(population()),
            &[peripheral()],
            &["orders".to_string()],
        )
        .unwrap();

        let pair = &holder.pairs[0];
        assert_eq!(pair.peripheral.numericals().len(), 1);
        assert_eq!(pair.peripheral.numericals()[0].name, "y");
    }

    #[test]
    fn test_unknown_peripheral() {
        let err = TableHolder::new(
            &tree(false, false),
            DataFrameView::whole(population()),
            &[peripheral()],
            &["somewhere_else".to_string()],
        );
        assert!(matches!(err, Err(RelPropError::TableNotFound(_))));
    }
}
