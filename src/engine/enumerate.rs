//! Candidate feature enumeration.
//!
//! For each join edge, for each condition set generated for that edge, for
//! each column compatible with each enabled aggregation, one
//! [`AbstractFeature`] is emitted. The space is enumerated exhaustively
//! within the bounds set by the hyperparameters; selection happens later.

use std::collections::HashMap;

use crate::config::Hyperparameters;
use crate::engine::feature::{AbstractFeature, AggKind, Condition, DataUsed};
use crate::engine::table_holder::{TableHolder, TablePair};
use crate::frame::column::{is_comparison_only, is_time_stamp};
use crate::frame::{DataFrame, IntColumn, Role};

/// Enumerate every candidate feature over the holder's join edges.
///
/// `subfeature_counts[i]` is the number of output columns of the child
/// engine fitted for edge `i` (0 when the edge has no joined subtree).
pub fn enumerate(
    hyp: &Hyperparameters,
    holder: &TableHolder,
    subfeature_counts: &[usize],
) -> Vec<AbstractFeature> {
    let conditions = make_conditions(hyp, holder);

    let mut features = Vec::new();
    for (i, pair) in holder.pairs.iter().enumerate() {
        let edge_conditions: Vec<&Vec<Condition>> = conditions
            .iter()
            .filter(|set| set.iter().all(|c| c.peripheral() == i))
            .collect();

        fit_on_peripheral(
            hyp,
            pair,
            i,
            &edge_conditions,
            subfeature_counts.get(i).copied().unwrap_or(0),
            &mut features,
        );
    }
    features
}

// ── Condition generation ───────────────────────────────────────────────────

/// Generate every condition set: the empty set first, then one singleton
/// set per generated condition.
fn make_conditions(hyp: &Hyperparameters, holder: &TableHolder) -> Vec<Vec<Condition>> {
    let mut conditions = vec![Vec::new()];

    for (i, pair) in holder.pairs.iter().enumerate() {
        make_categorical_conditions(hyp, pair, i, &mut conditions);
        make_lag_conditions(hyp, pair, i, &mut conditions);
        make_same_units_categorical_conditions(pair, i, &mut conditions);
    }

    conditions
}

fn make_categorical_conditions(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &mut Vec<Vec<Condition>>,
) {
    if hyp.n_most_frequent == 0 {
        return;
    }

    for (input_col, col) in pair.peripheral.categoricals().iter().enumerate() {
        if is_comparison_only(&col.unit) {
            continue;
        }
        for category in most_frequent_categories(col, hyp.n_most_frequent) {
            conditions.push(vec![Condition::CategoryEqual {
                peripheral,
                input_col,
                category,
            }]);
        }
    }
}

fn make_lag_conditions(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &mut Vec<Vec<Condition>>,
) {
    if pair.population.frame().time_stamps().is_empty()
        || pair.peripheral.time_stamps().is_empty()
    {
        return;
    }

    // max_lag and delta_t are validated as a pair before fit starts.
    for i in 0..hyp.max_lag {
        conditions.push(vec![Condition::LagWindow {
            peripheral,
            lower: hyp.delta_t * i as f64,
            upper: hyp.delta_t * (i + 1) as f64,
        }]);
    }
}

fn make_same_units_categorical_conditions(
    pair: &TablePair,
    peripheral: usize,
    conditions: &mut Vec<Vec<Condition>>,
) {
    for (output_col, pop_col) in pair.population.frame().categoricals().iter().enumerate() {
        for (input_col, peri_col) in pair.peripheral.categoricals().iter().enumerate() {
            if pop_col.unit.is_empty() || pop_col.unit != peri_col.unit {
                continue;
            }
            conditions.push(vec![Condition::SameUnitsCategorical {
                peripheral,
                input_col,
                output_col,
            }]);
        }
    }
}

/// The up-to-`n` most frequent non-null categories of a column, most
/// frequent first; ties broken by lower id for determinism.
pub fn most_frequent_categories(col: &IntColumn, n: usize) -> Vec<i64> {
    let mut frequencies: HashMap<i64, usize> = HashMap::new();
    for &id in col.as_slice() {
        *frequencies.entry(id).or_insert(0) += 1;
    }

    let mut pairs: Vec<(i64, usize)> = frequencies.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    pairs
        .into_iter()
        .map(|(id, _)| id)
        .filter(|&id| id >= 0)
        .take(n)
        .collect()
}

// ── Per-edge feature generation ────────────────────────────────────────────

fn fit_on_peripheral(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[&Vec<Condition>],
    num_subfeatures: usize,
    out: &mut Vec<AbstractFeature>,
) {
    for cond in conditions {
        fit_on_categoricals(hyp, pair, peripheral, cond, out);
        fit_on_categoricals_by_categories(hyp, pair, peripheral, cond, out);
        fit_on_discretes(hyp, pair, peripheral, cond, out);
        fit_on_numericals(hyp, pair, peripheral, cond, out);
        fit_on_same_units_categorical(hyp, pair, peripheral, cond, out);
        fit_on_same_units_discrete(hyp, pair, peripheral, cond, out);
        fit_on_same_units_numerical(hyp, pair, peripheral, cond, out);
        fit_on_subfeatures(hyp, pair, peripheral, cond, num_subfeatures, out);

        if hyp.aggregations.contains(&AggKind::AvgTimeBetween)
            && !pair.peripheral.time_stamps().is_empty()
        {
            out.push(AbstractFeature::new(
                AggKind::AvgTimeBetween,
                peripheral,
                DataUsed::NotApplicable,
                0,
                (*cond).clone(),
            ));
        }
    }

    if hyp.has_count() {
        out.push(AbstractFeature::new(
            AggKind::Count,
            peripheral,
            DataUsed::NotApplicable,
            0,
            Vec::new(),
        ));
    }
}

/// Whether the aggregation cannot be evaluated on this edge because it
/// needs time stamps that are not there. FIRST, LAST and TREND all read
/// the peripheral time stamp and anchor on the population time stamp.
fn skip_time_based(agg: AggKind, pair: &TablePair) -> bool {
    if !(agg.is_first_last() || agg == AggKind::Trend) {
        return false;
    }
    pair.population.frame().time_stamps().is_empty() || pair.peripheral.time_stamps().is_empty()
}

fn any_categorical_condition(conditions: &[Condition]) -> bool {
    conditions
        .iter()
        .any(|c| matches!(c, Condition::CategoryEqual { .. }))
}

fn fit_on_categoricals(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[Condition],
    out: &mut Vec<AbstractFeature>,
) {
    // Conditioning on a category while aggregating categories would mostly
    // reproduce the condition; the original skips the whole family.
    if any_categorical_condition(conditions) {
        return;
    }

    for (input_col, col) in pair.peripheral.categoricals().iter().enumerate() {
        if is_comparison_only(&col.unit) {
            continue;
        }
        for &agg in &hyp.aggregations {
            if !agg.is_categorical() {
                continue;
            }
            out.push(AbstractFeature::new(
                agg,
                peripheral,
                DataUsed::Categorical,
                input_col,
                conditions.to_vec(),
            ));
        }
    }
}

fn fit_on_categoricals_by_categories(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[Condition],
    out: &mut Vec<AbstractFeature>,
) {
    if any_categorical_condition(conditions) {
        return;
    }

    for (input_col, col) in pair.peripheral.categoricals().iter().enumerate() {
        if is_comparison_only(&col.unit) {
            continue;
        }
        for category in most_frequent_categories(col, hyp.n_most_frequent) {
            for &agg in &hyp.aggregations {
                if !agg.is_numerical() || skip_time_based(agg, pair) {
                    continue;
                }
                out.push(AbstractFeature::category_sliced(
                    agg,
                    peripheral,
                    input_col,
                    category,
                    conditions.to_vec(),
                ));
            }
        }
    }
}

fn fit_on_discretes(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[Condition],
    out: &mut Vec<AbstractFeature>,
) {
    for (input_col, col) in pair.peripheral.discretes().iter().enumerate() {
        if is_comparison_only(&col.unit) {
            continue;
        }
        for &agg in &hyp.aggregations {
            if !agg.is_numerical() || skip_time_based(agg, pair) {
                continue;
            }
            out.push(AbstractFeature::new(
                agg,
                peripheral,
                DataUsed::Discrete,
                input_col,
                conditions.to_vec(),
            ));
        }
    }
}

fn fit_on_numericals(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[Condition],
    out: &mut Vec<AbstractFeature>,
) {
    for (input_col, col) in pair.peripheral.numericals().iter().enumerate() {
        if is_comparison_only(&col.unit) {
            continue;
        }
        for &agg in &hyp.aggregations {
            if !agg.is_numerical() || skip_time_based(agg, pair) {
                continue;
            }
            out.push(AbstractFeature::new(
                agg,
                peripheral,
                DataUsed::Numerical,
                input_col,
                conditions.to_vec(),
            ));
        }
    }
}

fn fit_on_same_units_categorical(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[Condition],
    out: &mut Vec<AbstractFeature>,
) {
    for (output_col, pop_col) in pair.population.frame().categoricals().iter().enumerate() {
        for (input_col, peri_col) in pair.peripheral.categoricals().iter().enumerate() {
            if pop_col.unit.is_empty() || pop_col.unit != peri_col.unit {
                continue;
            }
            for &agg in &hyp.aggregations {
                if !agg.is_numerical() || skip_time_based(agg, pair) {
                    continue;
                }
                out.push(AbstractFeature::same_units(
                    agg,
                    peripheral,
                    DataUsed::SameUnitsCategorical,
                    input_col,
                    output_col,
                    conditions.to_vec(),
                ));
            }
        }
    }
}

fn fit_on_same_units_discrete(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[Condition],
    out: &mut Vec<AbstractFeature>,
) {
    same_units_numeric_family(
        hyp,
        pair,
        peripheral,
        conditions,
        pair.population.frame(),
        true,
        out,
    );
}

fn fit_on_same_units_numerical(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[Condition],
    out: &mut Vec<AbstractFeature>,
) {
    same_units_numeric_family(
        hyp,
        pair,
        peripheral,
        conditions,
        pair.population.frame(),
        false,
        out,
    );
}

fn same_units_numeric_family(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[Condition],
    pop_frame: &DataFrame,
    discrete: bool,
    out: &mut Vec<AbstractFeature>,
) {
    let (pop_cols, peri_cols) = if discrete {
        (pop_frame.discretes(), pair.peripheral.discretes())
    } else {
        (pop_frame.numericals(), pair.peripheral.numericals())
    };

    for (output_col, pop_col) in pop_cols.iter().enumerate() {
        for (input_col, peri_col) in peri_cols.iter().enumerate() {
            if pop_col.unit.is_empty() || pop_col.unit != peri_col.unit {
                continue;
            }
            // The difference of two time stamps is a duration; flagged so
            // the SQL emitter renders the subtraction on the raw stamps.
            let data_used = match (discrete, is_time_stamp(Role::Numerical, &pop_col.unit)) {
                (true, true) => DataUsed::SameUnitsDiscreteTs,
                (true, false) => DataUsed::SameUnitsDiscrete,
                (false, true) => DataUsed::SameUnitsNumericalTs,
                (false, false) => DataUsed::SameUnitsNumerical,
            };
            for &agg in &hyp.aggregations {
                if !agg.is_numerical() || skip_time_based(agg, pair) {
                    continue;
                }
                out.push(AbstractFeature::same_units(
                    agg,
                    peripheral,
                    data_used,
                    input_col,
                    output_col,
                    conditions.to_vec(),
                ));
            }
        }
    }
}

fn fit_on_subfeatures(
    hyp: &Hyperparameters,
    pair: &TablePair,
    peripheral: usize,
    conditions: &[Condition],
    num_subfeatures: usize,
    out: &mut Vec<AbstractFeature>,
) {
    for input_col in 0..num_subfeatures {
        for &agg in &hyp.aggregations {
            if !agg.is_numerical() || skip_time_based(agg, pair) {
                continue;
            }
            out.push(AbstractFeature::new(
                agg,
                peripheral,
                DataUsed::Subfeatures,
                input_col,
                conditions.to_vec(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DataFrameView, FloatColumn};
    use crate::placeholder::SchemaTree;
    use std::sync::Arc;

    fn make_holder(with_ts: bool, with_categorical: bool) -> TableHolder {
        let mut pop = DataFrame::new("population");
        pop.add_join_key(IntColumn::new("jk", "", vec![0, 1])).unwrap();
        if with_ts {
            pop.add_time_stamp(FloatColumn::new("ts", "", vec![1.0, 2.0]))
                .unwrap();
        }

        let mut peri = DataFrame::new("orders");
        peri.add_join_key(IntColumn::new("jk", "", vec![0, 1, 1])).unwrap();
        peri.add_numerical(FloatColumn::new("price", "dollars", vec![1.0, 2.0, 3.0]))
            .unwrap();
        if with_ts {
            peri.add_time_stamp(FloatColumn::new("ts", "", vec![0.5, 0.5, 1.5]))
                .unwrap();
        }
        if with_categorical {
            peri.add_categorical(IntColumn::new("color", "", vec![0, 0, 1]))
                .unwrap();
        }

        let mut tree = SchemaTree::new("population");
        tree.join(
            tree.root(),
            "orders",
            vec!["jk".into()],
            vec!["jk".into()],
            with_ts.then(|| "ts".into()),
            with_ts.then(|| "ts".into()),
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

    fn hyp(aggregations: Vec<AggKind>) -> Hyperparameters {
        Hyperparameters {
            aggregations,
            ..Default::default()
        }
    }

    #[test]
    fn test_count_emitted_once_with_empty_conditions() {
        let holder = make_holder(false, false);
        let features = enumerate(&hyp(vec![AggKind::Count]), &holder, &[0]);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].aggregation, AggKind::Count);
        assert!(features[0].conditions.is_empty());
    }

    #[test]
    fn test_numerical_aggregations_over_numerical_columns() {
        let holder = make_holder(false, false);
        let features = enumerate(&hyp(vec![AggKind::Avg, AggKind::Sum]), &holder, &[0]);
        // One numerical column × two aggregations, empty condition set only.
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| f.data_used == DataUsed::Numerical));
    }

    #[test]
    fn test_first_last_skipped_without_time_stamps() {
        let holder = make_holder(false, false);
        let features = enumerate(&hyp(vec![AggKind::First, AggKind::Last]), &holder, &[0]);
        assert!(features.is_empty());

        let holder = make_holder(true, false);
        let features = enumerate(&hyp(vec![AggKind::First, AggKind::Last]), &holder, &[0]);
        assert_eq!(features.len(), 2);
    }

    #[test]
    fn test_categorical_aggregations_need_categorical_columns() {
        let holder = make_holder(false, false);
        let features = enumerate(&hyp(vec![AggKind::CountDistinct]), &holder, &[0]);
        assert!(features.is_empty());

        let holder = make_holder(false, true);
        let features = enumerate(&hyp(vec![AggKind::CountDistinct]), &holder, &[0]);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].data_used, DataUsed::Categorical);
    }

    #[test]
    fn test_category_conditions_multiply_features() {
        let holder = make_holder(false, true);
        let mut h = hyp(vec![AggKind::Sum]);
        h.n_most_frequent = 2;
        let features = enumerate(&h, &holder, &[0]);

        // Condition sets: empty, color=0, color=1.
        // SUM(price) under each of the three sets,
        // plus category-sliced SUM(color==0), SUM(color==1) for the empty set.
        let plain: Vec<_> = features
            .iter()
            .filter(|f| f.data_used == DataUsed::Numerical)
            .collect();
        assert_eq!(plain.len(), 3);

        let sliced: Vec<_> = features.iter().filter(|f| f.category.is_some()).collect();
        assert_eq!(sliced.len(), 2);
        assert!(sliced.iter().all(|f| f.conditions.is_empty()));
    }

    #[test]
    fn test_lag_conditions_generated_per_window() {
        let holder = make_holder(true, false);
        let mut h = hyp(vec![AggKind::Sum]);
        h.max_lag = 3;
        h.delta_t = 10.0;
        let features = enumerate(&h, &holder, &[0]);

        // Empty set + three lag windows = four SUM(price) lines.
        assert_eq!(features.len(), 4);
        let windows: Vec<_> = features
            .iter()
            .filter_map(|f| f.conditions.first())
            .collect();
        assert_eq!(windows.len(), 3);
        if let Condition::LagWindow { lower, upper, .. } = windows[2] {
            assert_eq!(*lower, 20.0);
            assert_eq!(*upper, 30.0);
        } else {
            panic!("expected a lag window");
        }
    }

    #[test]
    fn test_subfeature_columns_enumerated() {
        let holder = make_holder(false, false);
        let features = enumerate(&hyp(vec![AggKind::Max]), &holder, &[2]);
        let sub: Vec<_> = features
            .iter()
            .filter(|f| f.data_used == DataUsed::Subfeatures)
            .collect();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub[0].input_col, 0);
        assert_eq!(sub[1].input_col, 1);
    }

    #[test]
    fn test_most_frequent_categories_ordering() {
        let col = IntColumn::new("c", "", vec![2, 2, 2, 0, 0, 1, -1, -1, -1, -1]);
        // Nulls are the most frequent value but are filtered out.
        assert_eq!(most_frequent_categories(&col, 2), vec![2, 0]);
        assert_eq!(most_frequent_categories(&col, 10), vec![2, 0, 1]);
    }

    #[test]
    fn test_comparison_only_columns_excluded() {
        let mut pop = DataFrame::new("population");
        pop.add_join_key(IntColumn::new("jk", "", vec![0])).unwrap();

        let mut peri = DataFrame::new("orders");
        peri.add_join_key(IntColumn::new("jk", "", vec![0])).unwrap();
        peri.add_numerical(FloatColumn::new("x", "comparison only", vec![1.0]))
            .unwrap();

        let mut tree = SchemaTree::new("population");
        tree.join_on(0, "orders", "jk", "jk");
        let holder = TableHolder::new(
            &tree,
            DataFrameView::whole(Arc::new(pop)),
            &[Arc::new(peri)],
            &["orders".to_string()],
        )
        .unwrap();

        let features = enumerate(&hyp(vec![AggKind::Sum]), &holder, &[0]);
        assert!(features.is_empty());
    }
}
