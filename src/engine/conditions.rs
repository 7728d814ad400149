//! Compiled match predicates.
//!
//! A feature's condition list compiles into a single predicate over
//! matches; a match passes iff every condition passes. Compilation is
//! independent of the row and happens once per shard — the compiled
//! predicate is reused across every row the shard builds.

use crate::engine::feature::{AbstractFeature, Condition};
use crate::engine::matches::Match;
use crate::engine::table_holder::TablePair;
use crate::frame::DataFrameView;

/// A compiled predicate over matches.
pub struct ConditionFn(Box<dyn Fn(&Match) -> bool + Send + Sync>);

impl ConditionFn {
    /// Whether the match passes every condition.
    #[inline]
    pub fn passes(&self, m: &Match) -> bool {
        (self.0)(m)
    }
}

/// Compile one feature's condition list into a predicate.
pub fn compile(pair: &TablePair, feature: &AbstractFeature) -> ConditionFn {
    let mut parts: Vec<Box<dyn Fn(&Match) -> bool + Send + Sync>> =
        Vec::with_capacity(feature.conditions.len());

    for cond in &feature.conditions {
        debug_assert_eq!(cond.peripheral(), feature.peripheral);
        parts.push(compile_single(pair, cond));
    }

    if parts.is_empty() {
        return ConditionFn(Box::new(|_| true));
    }
    if parts.len() == 1
        && let Some(only) = parts.pop()
    {
        return ConditionFn(only);
    }
    ConditionFn(Box::new(move |m| parts.iter().all(|p| p(m))))
}

fn compile_single(
    pair: &TablePair,
    condition: &Condition,
) -> Box<dyn Fn(&Match) -> bool + Send + Sync> {
    match *condition {
        Condition::CategoryEqual {
            input_col,
            category,
            ..
        } => {
            let col = pair.peripheral.categoricals()[input_col].clone();
            Box::new(move |m| col.get(m.ix_input as usize) == category)
        }

        Condition::SameUnitsCategorical {
            input_col,
            output_col,
            ..
        } => {
            let view = pair.population.clone();
            let pop_col = pair.population.frame().categoricals()[output_col].clone();
            let peri_col = pair.peripheral.categoricals()[input_col].clone();
            Box::new(move |m| {
                pop_col.get(view.base_row(m.ix_output as usize)) == peri_col.get(m.ix_input as usize)
            })
        }

        Condition::LagWindow { lower, upper, .. } => {
            let view = pair.population.clone();
            let pop_col = ts_column(&pair.population, pair.pop_ts_col);
            let peri_col = pair.peripheral.time_stamps()[pair.peri_ts_col.unwrap_or(0)].clone();
            Box::new(move |m| {
                let pop_ts = pop_col.get(view.base_row(m.ix_output as usize));
                let peri_ts = peri_col.get(m.ix_input as usize);
                peri_ts + lower <= pop_ts && pop_ts < peri_ts + upper
            })
        }
    }
}

fn ts_column(view: &DataFrameView, col: Option<usize>) -> crate::frame::FloatColumn {
    view.frame().time_stamps()[col.unwrap_or(0)].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::feature::{AggKind, DataUsed};
    use crate::engine::table_holder::TableHolder;
    use crate::frame::{DataFrame, FloatColumn, IntColumn};
    use crate::placeholder::SchemaTree;
    use std::sync::Arc;

    fn pair() -> TablePair {
        let mut pop = DataFrame::new("population");
        pop.add_join_key(IntColumn::new("jk", "", vec![0, 0])).unwrap();
        pop.add_time_stamp(FloatColumn::new("ts", "", vec![10.0, 100.0]))
            .unwrap();
        pop.add_categorical(IntColumn::new("color", "color", vec![5, 6]))
            .unwrap();

        let mut peri = DataFrame::new("orders");
        peri.add_join_key(IntColumn::new("jk", "", vec![0, 0, 0])).unwrap();
        peri.add_time_stamp(FloatColumn::new("ts", "", vec![3.0, 7.0, 9.0]))
            .unwrap();
        peri.add_categorical(IntColumn::new("color", "color", vec![5, 5, 6]))
            .unwrap();

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

        TableHolder::new(
            &tree,
            DataFrameView::whole(Arc::new(pop)),
            &[Arc::new(peri)],
            &["orders".to_string()],
        )
        .unwrap()
        .pairs
        .remove(0)
    }

    fn feature(conditions: Vec<Condition>) -> AbstractFeature {
        AbstractFeature::new(AggKind::Count, 0, DataUsed::NotApplicable, 0, conditions)
    }

    #[test]
    fn test_empty_conditions_pass_everything() {
        let p = pair();
        let f = compile(&p, &feature(vec![]));
        assert!(f.passes(&Match::new(0, 0)));
    }

    #[test]
    fn test_category_equal() {
        let p = pair();
        let f = compile(
            &p,
            &feature(vec![Condition::CategoryEqual {
                peripheral: 0,
                input_col: 0,
                category: 5,
            }]),
        );
        assert!(f.passes(&Match::new(0, 0)));
        assert!(f.passes(&Match::new(0, 1)));
        assert!(!f.passes(&Match::new(0, 2)));
    }

    #[test]
    fn test_same_units_categorical() {
        let p = pair();
        let f = compile(
            &p,
            &feature(vec![Condition::SameUnitsCategorical {
                peripheral: 0,
                input_col: 0,
                output_col: 0,
            }]),
        );
        // Population row 0 has color 5: peripheral rows 0, 1 match.
        assert!(f.passes(&Match::new(0, 0)));
        assert!(!f.passes(&Match::new(0, 2)));
        // Population row 1 has color 6: only peripheral row 2 matches.
        assert!(!f.passes(&Match::new(1, 0)));
        assert!(f.passes(&Match::new(1, 2)));
    }

    #[test]
    fn test_lag_window() {
        let p = pair();
        // One window of width 5: population_ts ∈ [peri_ts, peri_ts + 5).
        let f = compile(
            &p,
            &feature(vec![Condition::LagWindow {
                peripheral: 0,
                lower: 0.0,
                upper: 5.0,
            }]),
        );
        // pop ts 10: peri 3 (diff 7) out, peri 7 (diff 3) in, peri 9 (diff 1) in.
        assert!(!f.passes(&Match::new(0, 0)));
        assert!(f.passes(&Match::new(0, 1)));
        assert!(f.passes(&Match::new(0, 2)));
    }

    #[test]
    fn test_conjunction() {
        let p = pair();
        let f = compile(
            &p,
            &feature(vec![
                Condition::CategoryEqual {
                    peripheral: 0,
                    input_col: 0,
                    category: 5,
                },
                Condition::LagWindow {
                    peripheral: 0,
                    lower: 0.0,
                    upper: 5.0,
                },
            ]),
        );
        // Row 1 passes both: color 5 and diff 3.
        assert!(f.passes(&Match::new(0, 1)));
        // Row 0 passes the category but not the window.
        assert!(!f.passes(&Match::new(0, 0)));
        // Row 2 passes the window but not the category.
        assert!(!f.passes(&Match::new(0, 2)));
    }
}
