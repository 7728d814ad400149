//! Shared builders for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use relprop::config::Hyperparameters;
use relprop::engine::{AggKind, FeatureEngine};
use relprop::frame::{DataFrame, FloatColumn, IntColumn};
use relprop::placeholder::SchemaTree;

/// A population frame with a single join key and target column.
pub fn population(keys: Vec<i64>, target: Vec<f64>) -> Arc<DataFrame> {
    let mut df = DataFrame::new("population");
    df.add_join_key(IntColumn::new("jk", "", keys)).unwrap();
    df.add_target(FloatColumn::new("y", "", target)).unwrap();
    Arc::new(df)
}

/// A peripheral frame with a join key and one numerical column.
pub fn peripheral(keys: Vec<i64>, values: Vec<f64>) -> Arc<DataFrame> {
    let mut df = DataFrame::new("orders");
    df.add_join_key(IntColumn::new("jk", "", keys)).unwrap();
    df.add_numerical(FloatColumn::new("value", "", values)).unwrap();
    Arc::new(df)
}

/// A single-edge engine over `population -> orders` on `jk`.
pub fn single_edge_engine(aggregations: Vec<AggKind>) -> FeatureEngine {
    let mut tree = SchemaTree::new("population");
    tree.join_on(tree.root(), "orders", "jk", "jk");
    FeatureEngine::new(
        Hyperparameters {
            aggregations,
            num_threads: 1,
            ..Default::default()
        },
        vec!["orders".to_string()],
        tree,
    )
    .unwrap()
}

/// A single-edge engine with a temporal join on `ts` and lag-window knobs.
pub fn temporal_engine(aggregations: Vec<AggKind>, max_lag: usize, delta_t: f64) -> FeatureEngine {
    let mut tree = SchemaTree::new("population");
    tree.join(
        tree.root(),
        "orders",
        vec!["jk".into()],
        vec!["jk".into()],
        Some("ts".into()),
        Some("ts".into()),
        None,
        false,
    );
    FeatureEngine::new(
        Hyperparameters {
            aggregations,
            num_threads: 1,
            max_lag,
            delta_t,
            ..Default::default()
        },
        vec!["orders".to_string()],
        tree,
    )
    .unwrap()
}
