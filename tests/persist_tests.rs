//! Round-trip tests for persisted engines.
//!
//! A reloaded engine must transform identically to the one that was saved.

mod common;

use std::sync::Arc;

use relprop::engine::AggKind;
use relprop::persist;

use common::{peripheral, population, single_edge_engine, temporal_engine};

#[test]
fn test_fitted_roundtrip_preserves_features() {
    let pop = population(vec![0, 1], vec![1.0, 2.0]);
    let peri = peripheral(vec![0, 0, 1], vec![3.0, 5.0, 7.0]);

    let mut engine = single_edge_engine(vec![AggKind::Count, AggKind::Sum, AggKind::Avg]);
    engine.fit(&pop, &[Arc::clone(&peri)]).unwrap();

    let json = persist::to_json(&engine).unwrap();
    let reloaded = persist::from_json(&json).unwrap();

    assert!(reloaded.is_fitted());
    assert_eq!(reloaded.num_features(), engine.num_features());
    assert_eq!(reloaded.features().unwrap(), engine.features().unwrap());
    assert_eq!(
        reloaded.population_schema().unwrap(),
        engine.population_schema().unwrap()
    );
}

#[test]
fn test_reloaded_engine_transforms_identically() {
    let pop = population(vec![0, 1, 2], vec![1.0, 0.0, 1.0]);
    let peri = peripheral(
        vec![0, 0, 1, 2, 2, 2],
        vec![1.0, 4.0, 9.0, 2.0, 2.0, 5.0],
    );

    let mut engine = single_edge_engine(vec![
        AggKind::Count,
        AggKind::Sum,
        AggKind::Avg,
        AggKind::Min,
        AggKind::Max,
        AggKind::Median,
        AggKind::Stddev,
    ]);
    engine.fit(&pop, &[Arc::clone(&peri)]).unwrap();

    let reloaded = persist::from_json(&persist::to_json(&engine).unwrap()).unwrap();

    let original = engine.transform(&pop, &[Arc::clone(&peri)]).unwrap();
    let roundtrip = reloaded.transform(&pop, &[peri]).unwrap();

    assert_eq!(original.nrows(), roundtrip.nrows());
    assert_eq!(original.ncols(), roundtrip.ncols());
    for row in 0..original.nrows() {
        for col in 0..original.ncols() {
            assert_eq!(
                original.get(row, col).to_bits(),
                roundtrip.get(row, col).to_bits(),
                "cell ({row}, {col}) changed across the round trip"
            );
        }
    }
}

#[test]
fn test_lag_window_conditions_survive_roundtrip() {
    let mut engine = temporal_engine(vec![AggKind::Avg], 3, 60.0);

    // Fit over a minimal temporal data set so conditions materialize.
    use relprop::frame::{DataFrame, FloatColumn, IntColumn};
    let mut pop = DataFrame::new("population");
    pop.add_join_key(IntColumn::new("jk", "", vec![0])).unwrap();
    pop.add_time_stamp(FloatColumn::new("ts", "", vec![100.0])).unwrap();
    let pop = Arc::new(pop);

    let mut peri = DataFrame::new("orders");
    peri.add_join_key(IntColumn::new("jk", "", vec![0, 0])).unwrap();
    peri.add_time_stamp(FloatColumn::new("ts", "", vec![50.0, 90.0]))
        .unwrap();
    peri.add_numerical(FloatColumn::new("value", "", vec![1.0, 2.0]))
        .unwrap();
    let peri = Arc::new(peri);

    engine.fit(&pop, &[peri]).unwrap();

    let reloaded = persist::from_json(&persist::to_json(&engine).unwrap()).unwrap();
    assert_eq!(reloaded.features().unwrap(), engine.features().unwrap());
    assert_eq!(reloaded.hyperparameters(), engine.hyperparameters());
}
