//! Per-row feature evaluation.
//!
//! A [`RowBuilder`] owns everything one worker thread needs to turn a
//! population row into one row of the feature matrix: the per-edge match
//! buffers, the compiled condition predicates, the incremental aggregation
//! states, and the per-row memoization of prepared match buffers.
//!
//! Features that share (join edge, column family, input/output column,
//! category, condition set) differ only in their aggregation; the prepared
//! buffer — matches filtered by the conditions, values filled, nulls
//! partitioned to the front, the valid tail sorted by value — is built once
//! per row for the whole family and reused across its aggregations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::conditions::{self, ConditionFn};
use crate::engine::feature::{AbstractFeature, AggKind, DataUsed};
use crate::engine::kernels;
use crate::engine::matches::{self, Match};
use crate::engine::state::{self, AggregationState};
use crate::engine::subfeatures::SubfeatureOutput;
use crate::engine::table_holder::TablePair;
use crate::error::{RelPropError, Result};

/// Shared, immutable inputs of a build: the resolved edges, the abstract
/// features, the indices of the features to evaluate, the child engines'
/// outputs per edge, and the cooperative cancel flag.
pub struct BuildContext<'a> {
    pub pairs: &'a [TablePair],
    pub features: &'a [AbstractFeature],
    pub index: &'a [usize],
    pub subfeatures: &'a [Option<SubfeatureOutput>],
    pub cancel: Option<&'a AtomicBool>,
}

impl BuildContext<'_> {
    /// Whether the cancel flag was raised.
    pub fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }
}

/// One family of features sharing a prepared match buffer.
struct PrepGroup {
    /// Index (into `ctx.index`) of the representative feature.
    representative: usize,
    condition_fn: ConditionFn,
}

/// The reusable prepared buffer of one family.
struct Prepared {
    matches: Vec<Match>,
    first_valid: usize,
    /// View row the buffer was prepared for; rebuilt when it differs.
    row: Option<usize>,
}

/// Per-thread feature evaluator.
pub struct RowBuilder<'a> {
    ctx: &'a BuildContext<'a>,
    /// Match buffer per join edge, rebuilt per row, allocation reused.
    match_bufs: Vec<Vec<Match>>,
    /// Family id per `ctx.index` position.
    group_of: Vec<usize>,
    groups: Vec<PrepGroup>,
    memo: Vec<Prepared>,
    states: HashMap<AggKind, AggregationState>,
}

impl<'a> RowBuilder<'a> {
    pub fn new(ctx: &'a BuildContext<'a>) -> Self {
        let mut groups: Vec<PrepGroup> = Vec::new();
        let mut group_of = Vec::with_capacity(ctx.index.len());

        for (pos, &ix) in ctx.index.iter().enumerate() {
            let feature = &ctx.features[ix];
            let found = groups.iter().position(|g| {
                let other = &ctx.features[ctx.index[g.representative]];
                other.peripheral == feature.peripheral
                    && other.data_used == feature.data_used
                    && other.input_col == feature.input_col
                    && other.output_col == feature.output_col
                    && other.category == feature.category
                    && other.conditions == feature.conditions
                    // COUNT fills 1.0 per match, AVG TIME BETWEEN fills the
                    // time stamp; same family key, different values.
                    && (other.data_used != DataUsed::NotApplicable
                        || other.aggregation == feature.aggregation)
            });
            match found {
                Some(g) => group_of.push(g),
                None => {
                    groups.push(PrepGroup {
                        representative: pos,
                        condition_fn: conditions::compile(&ctx.pairs[feature.peripheral], feature),
                    });
                    group_of.push(groups.len() - 1);
                }
            }
        }

        let memo = groups
            .iter()
            .map(|_| Prepared {
                matches: Vec::new(),
                first_valid: 0,
                row: None,
            })
            .collect();

        Self {
            ctx,
            match_bufs: vec![Vec::new(); ctx.pairs.len()],
            group_of,
            groups,
            memo,
            states: HashMap::new(),
        }
    }

    /// Evaluate every indexed feature for one population view row, writing
    /// the raw values into `out` (length = `ctx.index.len()`).
    ///
    /// Values are written as computed; the flush into the output matrix
    /// projects NaN/±∞ to 0.0. The cancel flag is checked between feature
    /// evaluations.
    pub fn build_row(&mut self, view_row: usize, out: &mut [f64]) -> Result<()> {
        let ctx = self.ctx;
        debug_assert_eq!(out.len(), ctx.index.len());

        for (pair, buf) in ctx.pairs.iter().zip(self.match_bufs.iter_mut()) {
            buf.clear();
            matches::make_matches(pair, view_row, buf);
        }

        // Memoization is per row.
        for prepared in &mut self.memo {
            prepared.row = None;
        }

        for pos in 0..ctx.index.len() {
            if ctx.cancelled() {
                return Err(RelPropError::Cancelled);
            }
            let feature = &ctx.features[ctx.index[pos]];
            out[pos] = self.evaluate(pos, feature, view_row);
        }

        Ok(())
    }

    fn evaluate(&mut self, pos: usize, feature: &AbstractFeature, view_row: usize) -> f64 {
        let group_ix = self.group_of[pos];
        self.prepare(group_ix, feature, view_row);

        let pair = &self.ctx.pairs[feature.peripheral];
        let prepared = &mut self.memo[group_ix];
        let valid = &mut prepared.matches[prepared.first_valid..];

        match feature.aggregation {
            AggKind::First => kernels::first(valid, peripheral_ts(pair)),
            AggKind::Last => kernels::last(valid, peripheral_ts(pair)),
            AggKind::AvgTimeBetween => kernels::avg_time_between(valid),
            AggKind::Trend => {
                let base_row = pair.population.base_row(view_row);
                let pop_ts = pair.population.frame().time_stamps()[pair.pop_ts_col.unwrap_or(0)]
                    .get(base_row);
                kernels::trend(valid, peripheral_ts(pair), pop_ts)
            }
            kind => {
                let state = self
                    .states
                    .entry(kind)
                    .or_insert_with(|| AggregationState::new(kind, 1));
                state.activate_all(valid);
                let value = state.value(0);
                // Restore the zero baseline and the flags so the buffer can
                // serve the family's next aggregation untouched.
                state.revert_to_commit(valid);
                value
            }
        }
    }

    /// Build the family's prepared buffer for this row if it is not already
    /// current: filter by conditions, fill values, partition nulls to the
    /// front, sort the valid tail by value.
    fn prepare(&mut self, group_ix: usize, feature: &AbstractFeature, view_row: usize) {
        let prepared = &mut self.memo[group_ix];
        if prepared.row == Some(view_row) {
            return;
        }

        let ctx = self.ctx;
        let pair = &ctx.pairs[feature.peripheral];
        let sub = ctx.subfeatures[feature.peripheral].as_ref();
        let condition_fn = &self.groups[group_ix].condition_fn;
        let base_row = pair.population.base_row(view_row);

        prepared.matches.clear();
        let buf = &self.match_bufs[feature.peripheral];
        for m in buf {
            if !condition_fn.passes(m) {
                continue;
            }
            let mut copy = *m;
            // The state machines run over a single output row.
            copy.ix_output = 0;
            copy.activated = false;
            copy.value = value_to_aggregate(pair, sub, feature, base_row, m.ix_input as usize);
            prepared.matches.push(copy);
        }

        prepared.first_valid = state::separate_null_values(&mut prepared.matches);
        state::sort_matches(&mut prepared.matches[prepared.first_valid..]);
        prepared.row = Some(view_row);
    }
}

fn peripheral_ts(pair: &TablePair) -> &[f64] {
    pair.peripheral.time_stamps()[pair.peri_ts_col.unwrap_or(0)].as_slice()
}

/// The value a match contributes to the aggregation, per column family.
/// Null inputs become NaN so the null partition removes them.
fn value_to_aggregate(
    pair: &TablePair,
    sub: Option<&SubfeatureOutput>,
    feature: &AbstractFeature,
    base_row: usize,
    ix_input: usize,
) -> f64 {
    let peripheral = &pair.peripheral;
    let population = pair.population.frame();

    match feature.data_used {
        DataUsed::Numerical => peripheral.numericals()[feature.input_col].get(ix_input),
        DataUsed::Discrete => peripheral.discretes()[feature.input_col].get(ix_input),

        DataUsed::Categorical => {
            let id = peripheral.categoricals()[feature.input_col].get(ix_input);
            if id < 0 {
                return f64::NAN;
            }
            match feature.category {
                // Category slice: the indicator `col == category`.
                Some(category) => (id == category) as i64 as f64,
                // Distinct counting: the raw id.
                None => id as f64,
            }
        }

        DataUsed::SameUnitsCategorical => {
            let out_col = feature.output_col.unwrap_or(0);
            let pop_id = population.categoricals()[out_col].get(base_row);
            let peri_id = peripheral.categoricals()[feature.input_col].get(ix_input);
            if pop_id < 0 || peri_id < 0 {
                return f64::NAN;
            }
            (pop_id == peri_id) as i64 as f64
        }

        DataUsed::SameUnitsNumerical | DataUsed::SameUnitsNumericalTs => {
            let out_col = feature.output_col.unwrap_or(0);
            population.numericals()[out_col].get(base_row)
                - peripheral.numericals()[feature.input_col].get(ix_input)
        }

        DataUsed::SameUnitsDiscrete | DataUsed::SameUnitsDiscreteTs => {
            let out_col = feature.output_col.unwrap_or(0);
            population.discretes()[out_col].get(base_row)
                - peripheral.discretes()[feature.input_col].get(ix_input)
        }

        DataUsed::Subfeatures => match sub {
            Some(out) => out.get(ix_input, feature.input_col),
            None => f64::NAN,
        },

        DataUsed::NotApplicable => match feature.aggregation {
            // AVG TIME BETWEEN aggregates the time stamps themselves.
            AggKind::AvgTimeBetween => peripheral_ts(pair)[ix_input],
            _ => 1.0,
        },
    }
}

/// Number of rows per cache flush block.
pub const LOG_ITER: usize = 5000;

/// Flush a row-major cache block into the column-major output, projecting
/// NaN/±∞ to 0.0.
///
/// `rows[cache_begin..]` are the output rows the cached block covers, in
/// cache order.
pub fn flush_cache(
    cache: &[f64],
    ncols: usize,
    rows: &[usize],
    cache_begin: usize,
    writer: &mut crate::engine::matrix::ShardWriter<'_>,
) {
    let nrows = if ncols == 0 {
        0
    } else {
        (cache.len() / ncols).min(rows.len() - cache_begin)
    };
    for col in 0..ncols {
        for i in 0..nrows {
            let value = cache[i * ncols + col];
            let value = if value.is_nan() || value.is_infinite() {
                0.0
            } else {
                value
            };
            writer.set(rows[cache_begin + i], col, value);
        }
    }
}
