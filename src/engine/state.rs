//! Incremental aggregation state machines.
//!
//! An [`AggregationState`] maintains, per output (population) row, the
//! running aggregates of one aggregation kind while matches are activated
//! and deactivated. Activation and deactivation are exact mirrors; `commit`
//! publishes the current state as the new baseline and `revert_to_commit`
//! restores the baseline bit-for-bit, including the `activated` flag on
//! every touched match.
//!
//! # Sorting precondition
//!
//! Kinds that walk neighbors (MIN, MAX, MEDIAN, COUNT DISTINCT, COUNT MINUS
//! COUNT DISTINCT) require the match slice to be sorted by
//! (output row, value) before any activation — see [`sort_matches`]. The
//! neighbor walks then touch only same-output-row entries.
//!
//! # Null handling
//!
//! Matches whose value is NaN/±∞ must be partitioned to the front of the
//! slice with [`separate_null_values`] and excluded from activation.
//! Aggregates that can produce intermediate NaN (STDDEV, VAR, SKEWNESS)
//! project it to 0.0 immediately.

use crate::engine::feature::AggKind;
use crate::engine::matches::Match;
use crate::frame::is_null;

/// Partition matches with null values to the front of the slice.
///
/// Returns the index of the first non-null match. The non-null tail is the
/// slice to activate over. Deterministic for a fixed input order.
pub fn separate_null_values(matches: &mut [Match]) -> usize {
    let mut first_valid = 0;
    for i in 0..matches.len() {
        if is_null(matches[i].value) {
            matches.swap(i, first_valid);
            first_valid += 1;
        }
    }
    first_valid
}

/// Sort matches by (output row, value). Precondition for the neighbor-walk
/// kinds; values must be non-null (see [`separate_null_values`]).
pub fn sort_matches(matches: &mut [Match]) {
    matches.sort_unstable_by(|a, b| {
        a.ix_output
            .cmp(&b.ix_output)
            .then_with(|| a.value.total_cmp(&b.value))
    });
}

/// A deduplicating set of touched output-row indices.
#[derive(Debug, Default, Clone)]
struct UpdateSet {
    touched: Vec<u32>,
    member: Vec<bool>,
}

impl UpdateSet {
    fn with_capacity(nrows: usize) -> Self {
        Self {
            touched: Vec::new(),
            member: vec![false; nrows],
        }
    }

    #[inline]
    fn insert(&mut self, row: u32) {
        if !self.member[row as usize] {
            self.member[row as usize] = true;
            self.touched.push(row);
        }
    }

    fn clear(&mut self) {
        for &row in &self.touched {
            self.member[row as usize] = false;
        }
        self.touched.clear();
    }

    fn rows(&self) -> &[u32] {
        &self.touched
    }
}

/// Incremental state for one aggregation kind over `nrows` output rows.
#[derive(Debug)]
pub struct AggregationState {
    kind: AggKind,
    nrows: usize,

    y: Vec<f64>,
    y_committed: Vec<f64>,

    sum: Vec<f64>,
    sum_committed: Vec<f64>,

    sum_squared: Vec<f64>,
    sum_squared_committed: Vec<f64>,

    sum_cubed: Vec<f64>,
    sum_cubed_committed: Vec<f64>,

    count: Vec<f64>,
    count_committed: Vec<f64>,

    /// Index of the current representative match per output row
    /// (MIN/MAX: the extremum; MEDIAN: the greater of the middle pair).
    sample_ptr: Vec<Option<u32>>,
    sample_ptr_committed: Vec<Option<u32>>,

    /// Match indices whose `activated` flag was flipped since the last
    /// commit, in flip order. Walked backwards on revert.
    altered_samples: Vec<u32>,

    /// Output rows touched since the last `clear_updates_current`.
    updates_current: UpdateSet,
    /// Output rows touched since the last commit.
    updates_stored: UpdateSet,
}

impl AggregationState {
    fn needs_sum(kind: AggKind) -> bool {
        matches!(
            kind,
            AggKind::Avg | AggKind::Stddev | AggKind::Var | AggKind::Skewness
        )
    }

    fn needs_sum_squared(kind: AggKind) -> bool {
        matches!(kind, AggKind::Stddev | AggKind::Var | AggKind::Skewness)
    }

    fn needs_sum_cubed(kind: AggKind) -> bool {
        matches!(kind, AggKind::Skewness)
    }

    fn needs_count(kind: AggKind) -> bool {
        matches!(
            kind,
            AggKind::Avg
                | AggKind::Stddev
                | AggKind::Var
                | AggKind::Skewness
                | AggKind::Min
                | AggKind::Max
                | AggKind::Median
        )
    }

    fn needs_sample_ptr(kind: AggKind) -> bool {
        matches!(kind, AggKind::Min | AggKind::Max | AggKind::Median)
    }

    /// Create a state for `kind` over `nrows` output rows, all aggregates
    /// zero.
    pub fn new(kind: AggKind, nrows: usize) -> Self {
        debug_assert!(
            !kind.is_time_based(),
            "time-based kinds are evaluated by one-shot kernels"
        );
        let zeros = |needed: bool| if needed { vec![0.0; nrows] } else { Vec::new() };
        Self {
            kind,
            nrows,
            y: vec![0.0; nrows],
            y_committed: vec![0.0; nrows],
            sum: zeros(Self::needs_sum(kind)),
            sum_committed: zeros(Self::needs_sum(kind)),
            sum_squared: zeros(Self::needs_sum_squared(kind)),
            sum_squared_committed: zeros(Self::needs_sum_squared(kind)),
            sum_cubed: zeros(Self::needs_sum_cubed(kind)),
            sum_cubed_committed: zeros(Self::needs_sum_cubed(kind)),
            count: zeros(Self::needs_count(kind)),
            count_committed: zeros(Self::needs_count(kind)),
            sample_ptr: if Self::needs_sample_ptr(kind) {
                vec![None; nrows]
            } else {
                Vec::new()
            },
            sample_ptr_committed: if Self::needs_sample_ptr(kind) {
                vec![None; nrows]
            } else {
                Vec::new()
            },
            altered_samples: Vec::new(),
            updates_current: UpdateSet::with_capacity(nrows),
            updates_stored: UpdateSet::with_capacity(nrows),
        }
    }

    pub fn kind(&self) -> AggKind {
        self.kind
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// The current aggregate for one output row.
    #[inline]
    pub fn value(&self, row: usize) -> f64 {
        self.y[row]
    }

    /// The current aggregates for all output rows.
    pub fn values(&self) -> &[f64] {
        &self.y
    }

    /// Output rows touched since the last `clear_updates_current`.
    pub fn updates_current(&self) -> &[u32] {
        self.updates_current.rows()
    }

    pub fn clear_updates_current(&mut self) {
        self.updates_current.clear();
    }

    /// Output rows touched since the last commit.
    pub fn updates_stored(&self) -> &[u32] {
        self.updates_stored.rows()
    }

    // ── Activation families ──────────────────────────────────────────────

    /// Activate every inactive match: the aggregates take the value they
    /// have when every match counts.
    pub fn activate_all(&mut self, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if !matches[i].activated {
                self.activate_sample(i, matches);
            }
        }
    }

    /// Deactivate every active match.
    pub fn deactivate_all(&mut self, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if matches[i].activated {
                self.deactivate_sample(i, matches);
            }
        }
    }

    /// Activate exactly the inactive matches with value strictly above the
    /// threshold.
    pub fn activate_from_above(&mut self, threshold: f64, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if matches[i].value > threshold && !matches[i].activated {
                self.activate_sample(i, matches);
            }
        }
    }

    /// Deactivate exactly the active matches with value strictly above the
    /// threshold.
    pub fn deactivate_from_above(&mut self, threshold: f64, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if matches[i].value > threshold && matches[i].activated {
                self.deactivate_sample(i, matches);
            }
        }
    }

    /// Activate exactly the inactive matches with value at or below the
    /// threshold.
    pub fn activate_from_below(&mut self, threshold: f64, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if matches[i].value <= threshold && !matches[i].activated {
                self.activate_sample(i, matches);
            }
        }
    }

    /// Deactivate exactly the active matches with value at or below the
    /// threshold.
    pub fn deactivate_from_below(&mut self, threshold: f64, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if matches[i].value <= threshold && matches[i].activated {
                self.deactivate_sample(i, matches);
            }
        }
    }

    #[inline]
    fn in_window(value: f64, t: f64, delta_t: f64) -> bool {
        value > t - delta_t && value <= t
    }

    /// Activate matches with value in `(t − Δt, t]`.
    pub fn activate_in_window(&mut self, t: f64, delta_t: f64, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if Self::in_window(matches[i].value, t, delta_t) && !matches[i].activated {
                self.activate_sample(i, matches);
            }
        }
    }

    /// Deactivate matches with value in `(t − Δt, t]`.
    pub fn deactivate_in_window(&mut self, t: f64, delta_t: f64, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if Self::in_window(matches[i].value, t, delta_t) && matches[i].activated {
                self.deactivate_sample(i, matches);
            }
        }
    }

    /// Activate matches with value outside `(t − Δt, t]`.
    pub fn activate_outside_window(&mut self, t: f64, delta_t: f64, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if !Self::in_window(matches[i].value, t, delta_t) && !matches[i].activated {
                self.activate_sample(i, matches);
            }
        }
    }

    /// Deactivate matches with value outside `(t − Δt, t]`.
    pub fn deactivate_outside_window(&mut self, t: f64, delta_t: f64, matches: &mut [Match]) {
        for i in 0..matches.len() {
            if !Self::in_window(matches[i].value, t, delta_t) && matches[i].activated {
                self.deactivate_sample(i, matches);
            }
        }
    }

    /// Activate matches whose (categorical) value is in the sorted set.
    ///
    /// Null categories (negative ids) must not appear in `categories`.
    pub fn activate_containing_categories(&mut self, categories: &[f64], matches: &mut [Match]) {
        for i in 0..matches.len() {
            if categories.binary_search_by(|c| c.total_cmp(&matches[i].value)).is_ok()
                && !matches[i].activated
            {
                self.activate_sample(i, matches);
            }
        }
    }

    /// Deactivate matches whose value is in the sorted set.
    pub fn deactivate_containing_categories(&mut self, categories: &[f64], matches: &mut [Match]) {
        for i in 0..matches.len() {
            if categories.binary_search_by(|c| c.total_cmp(&matches[i].value)).is_ok()
                && matches[i].activated
            {
                self.deactivate_sample(i, matches);
            }
        }
    }

    /// Activate matches whose value is *not* in the sorted set. Matches with
    /// a null category (negative id) are skipped entirely.
    pub fn activate_not_containing_categories(
        &mut self,
        categories: &[f64],
        matches: &mut [Match],
    ) {
        for i in 0..matches.len() {
            if matches[i].value < 0.0 {
                continue;
            }
            if categories.binary_search_by(|c| c.total_cmp(&matches[i].value)).is_err()
                && !matches[i].activated
            {
                self.activate_sample(i, matches);
            }
        }
    }

    /// Deactivate matches whose value is *not* in the sorted set.
    pub fn deactivate_not_containing_categories(
        &mut self,
        categories: &[f64],
        matches: &mut [Match],
    ) {
        for i in 0..matches.len() {
            if matches[i].value < 0.0 {
                continue;
            }
            if categories.binary_search_by(|c| c.total_cmp(&matches[i].value)).is_err()
                && matches[i].activated
            {
                self.deactivate_sample(i, matches);
            }
        }
    }

    // ── Commit / revert / reset ──────────────────────────────────────────

    /// Publish the current state as the new baseline.
    pub fn commit(&mut self) {
        for &row in self.updates_stored.rows() {
            let r = row as usize;
            self.y_committed[r] = self.y[r];
            if !self.sum.is_empty() {
                self.sum_committed[r] = self.sum[r];
            }
            if !self.sum_squared.is_empty() {
                self.sum_squared_committed[r] = self.sum_squared[r];
            }
            if !self.sum_cubed.is_empty() {
                self.sum_cubed_committed[r] = self.sum_cubed[r];
            }
            if !self.count.is_empty() {
                self.count_committed[r] = self.count[r];
            }
            if !self.sample_ptr.is_empty() {
                self.sample_ptr_committed[r] = self.sample_ptr[r];
            }
        }
        self.updates_stored.clear();
        self.altered_samples.clear();
    }

    /// Undo every activation and deactivation since the last commit,
    /// restoring the aggregates and the `activated` flag on every touched
    /// match.
    pub fn revert_to_commit(&mut self, matches: &mut [Match]) {
        for &i in self.altered_samples.iter().rev() {
            let m = &mut matches[i as usize];
            m.activated = !m.activated;
        }
        self.altered_samples.clear();

        for &row in self.updates_stored.rows() {
            let r = row as usize;
            self.y[r] = self.y_committed[r];
            if !self.sum.is_empty() {
                self.sum[r] = self.sum_committed[r];
            }
            if !self.sum_squared.is_empty() {
                self.sum_squared[r] = self.sum_squared_committed[r];
            }
            if !self.sum_cubed.is_empty() {
                self.sum_cubed[r] = self.sum_cubed_committed[r];
            }
            if !self.count.is_empty() {
                self.count[r] = self.count_committed[r];
            }
            if !self.sample_ptr.is_empty() {
                self.sample_ptr[r] = self.sample_ptr_committed[r];
            }
        }
        self.updates_stored.clear();
        self.updates_current.clear();
    }

    /// Release transient bookkeeping, preserving the committed baseline.
    /// Intended to be called right after a commit.
    pub fn clear(&mut self) {
        self.altered_samples.clear();
        self.altered_samples.shrink_to_fit();
        self.updates_current.clear();
    }

    /// Zero all aggregates (current and committed) and clear all bookkeeping.
    /// Match flags are the caller's concern.
    pub fn reset(&mut self) {
        let zero = |v: &mut Vec<f64>| v.iter_mut().for_each(|x| *x = 0.0);
        zero(&mut self.y);
        zero(&mut self.y_committed);
        zero(&mut self.sum);
        zero(&mut self.sum_committed);
        zero(&mut self.sum_squared);
        zero(&mut self.sum_squared_committed);
        zero(&mut self.sum_cubed);
        zero(&mut self.sum_cubed_committed);
        zero(&mut self.count);
        zero(&mut self.count_committed);
        self.sample_ptr.iter_mut().for_each(|p| *p = None);
        self.sample_ptr_committed.iter_mut().for_each(|p| *p = None);
        self.altered_samples.clear();
        self.updates_current.clear();
        self.updates_stored.clear();
    }

    // ── Per-sample kernels ───────────────────────────────────────────────

    #[inline]
    fn touch(&mut self, row: u32) {
        self.updates_current.insert(row);
        self.updates_stored.insert(row);
    }

    #[inline]
    fn flip(&mut self, i: usize, matches: &mut [Match], to: bool) {
        debug_assert_ne!(matches[i].activated, to);
        matches[i].activated = to;
        self.altered_samples.push(i as u32);
    }

    /// Include one inactive match in the aggregation.
    fn activate_sample(&mut self, i: usize, matches: &mut [Match]) {
        let r = matches[i].ix_output as usize;
        let val = matches[i].value;
        self.touch(matches[i].ix_output);
        self.flip(i, matches, true);

        match self.kind {
            AggKind::Count => {
                self.y[r] += 1.0;
            }
            AggKind::Sum => {
                self.y[r] += val;
            }
            AggKind::Avg => {
                self.sum[r] += val;
                self.count[r] += 1.0;
                self.y[r] = self.sum[r] / self.count[r];
            }
            AggKind::Stddev => {
                self.sum[r] += val;
                self.sum_squared[r] += val * val;
                self.count[r] += 1.0;
                self.y[r] = project_nan(
                    (self.sum_squared[r] / self.count[r]
                        - (self.sum[r] / self.count[r]).powi(2))
                    .sqrt(),
                );
            }
            AggKind::Var => {
                self.sum[r] += val;
                self.sum_squared[r] += val * val;
                self.count[r] += 1.0;
                self.y[r] = project_nan(
                    self.sum_squared[r] / self.count[r] - (self.sum[r] / self.count[r]).powi(2),
                );
            }
            AggKind::Skewness => {
                self.sum[r] += val;
                self.sum_squared[r] += val * val;
                self.sum_cubed[r] += val * val * val;
                self.count[r] += 1.0;
                self.y[r] = self.calculate_skewness(r);
            }
            AggKind::Min => {
                self.count[r] += 1.0;
                let replace = match self.sample_ptr[r] {
                    None => true,
                    Some(ptr) => self.count[r] < 1.5 || i < ptr as usize,
                };
                if replace {
                    self.sample_ptr[r] = Some(i as u32);
                    self.y[r] = val;
                }
            }
            AggKind::Max => {
                self.count[r] += 1.0;
                let replace = match self.sample_ptr[r] {
                    None => true,
                    Some(ptr) => self.count[r] < 1.5 || i > ptr as usize,
                };
                if replace {
                    self.sample_ptr[r] = Some(i as u32);
                    self.y[r] = val;
                }
            }
            AggKind::Median => self.activate_median(i, matches),
            AggKind::CountDistinct => {
                // The count only grows if no activated neighbor shares the
                // value. Neighbors were just flipped, so exclude i itself.
                if !self.has_activated_neighbor(i, matches) {
                    self.y[r] += 1.0;
                }
            }
            AggKind::CountMinusCountDistinct => {
                // A duplicate of an already-active value grows the excess.
                if self.has_activated_neighbor(i, matches) {
                    self.y[r] += 1.0;
                }
            }
            AggKind::First | AggKind::Last | AggKind::AvgTimeBetween | AggKind::Trend => {
                debug_assert!(false, "time-based kinds use one-shot kernels");
            }
        }
    }

    /// Remove one active match from the aggregation. Exact inverse of
    /// [`Self::activate_sample`].
    fn deactivate_sample(&mut self, i: usize, matches: &mut [Match]) {
        let r = matches[i].ix_output as usize;
        let val = matches[i].value;
        self.touch(matches[i].ix_output);
        self.flip(i, matches, false);

        match self.kind {
            AggKind::Count => {
                self.y[r] -= 1.0;
                debug_assert!(self.y[r] >= 0.0);
            }
            AggKind::Sum => {
                self.y[r] -= val;
            }
            AggKind::Avg => {
                self.sum[r] -= val;
                self.count[r] -= 1.0;
                self.y[r] = if self.count[r] > 0.5 {
                    self.sum[r] / self.count[r]
                } else {
                    0.0
                };
            }
            AggKind::Stddev => {
                self.sum[r] -= val;
                self.sum_squared[r] -= val * val;
                self.count[r] -= 1.0;
                self.y[r] = if self.count[r] > 0.5 {
                    project_nan(
                        (self.sum_squared[r] / self.count[r]
                            - (self.sum[r] / self.count[r]).powi(2))
                        .sqrt(),
                    )
                } else {
                    0.0
                };
            }
            AggKind::Var => {
                self.sum[r] -= val;
                self.sum_squared[r] -= val * val;
                self.count[r] -= 1.0;
                self.y[r] = if self.count[r] > 0.5 {
                    project_nan(
                        self.sum_squared[r] / self.count[r]
                            - (self.sum[r] / self.count[r]).powi(2),
                    )
                } else {
                    0.0
                };
            }
            AggKind::Skewness => {
                self.sum[r] -= val;
                self.sum_squared[r] -= val * val;
                self.sum_cubed[r] -= val * val * val;
                self.count[r] -= 1.0;
                self.y[r] = self.calculate_skewness(r);
            }
            AggKind::Min => {
                self.count[r] -= 1.0;
                if self.count[r] < 0.5 {
                    self.sample_ptr[r] = None;
                    self.y[r] = 0.0;
                } else if self.sample_ptr[r] == Some(i as u32) {
                    // The minimum went away; the next activated neighbor
                    // upwards is the second smallest (sorted order).
                    match self.find_next_greater(i, matches) {
                        Some(j) => {
                            self.sample_ptr[r] = Some(j as u32);
                            self.y[r] = matches[j].value;
                        }
                        None => {
                            debug_assert!(false, "count > 0 but no activated neighbor");
                            self.sample_ptr[r] = None;
                            self.y[r] = 0.0;
                        }
                    }
                }
            }
            AggKind::Max => {
                self.count[r] -= 1.0;
                if self.count[r] < 0.5 {
                    self.sample_ptr[r] = None;
                    self.y[r] = 0.0;
                } else if self.sample_ptr[r] == Some(i as u32) {
                    match self.find_next_smaller(i, matches) {
                        Some(j) => {
                            self.sample_ptr[r] = Some(j as u32);
                            self.y[r] = matches[j].value;
                        }
                        None => {
                            debug_assert!(false, "count > 0 but no activated neighbor");
                            self.sample_ptr[r] = None;
                            self.y[r] = 0.0;
                        }
                    }
                }
            }
            AggKind::Median => self.deactivate_median(i, matches),
            AggKind::CountDistinct => {
                if !self.has_activated_neighbor(i, matches) {
                    self.y[r] -= 1.0;
                }
            }
            AggKind::CountMinusCountDistinct => {
                if self.has_activated_neighbor(i, matches) {
                    self.y[r] -= 1.0;
                }
            }
            AggKind::First | AggKind::Last | AggKind::AvgTimeBetween | AggKind::Trend => {
                debug_assert!(false, "time-based kinds use one-shot kernels");
            }
        }
    }

    fn calculate_skewness(&self, r: usize) -> f64 {
        if self.count[r] < 0.5 {
            return 0.0;
        }
        let n = self.count[r];
        let mean = self.sum[r] / n;
        let stddev = (self.sum_squared[r] / n - mean * mean).sqrt();
        let skewness = (self.sum_cubed[r] / n - 3.0 * mean * stddev * stddev - mean * mean * mean)
            / (stddev * stddev * stddev);
        project_nan(skewness)
    }

    /// Whether another *activated* match with the same value and output row
    /// neighbors `i` in the sorted order.
    fn has_activated_neighbor(&self, i: usize, matches: &[Match]) -> bool {
        let val = matches[i].value;
        let row = matches[i].ix_output;

        let mut j = i;
        while j > 0 {
            j -= 1;
            if matches[j].value != val || matches[j].ix_output != row {
                break;
            }
            if matches[j].activated {
                return true;
            }
        }

        let mut j = i + 1;
        while j < matches.len() {
            if matches[j].value != val || matches[j].ix_output != row {
                break;
            }
            if matches[j].activated {
                return true;
            }
            j += 1;
        }

        false
    }

    /// The next activated match above `i` with the same output row.
    fn find_next_greater(&self, i: usize, matches: &[Match]) -> Option<usize> {
        let row = matches[i].ix_output;
        ((i + 1)..matches.len())
            .take_while(|&j| matches[j].ix_output == row)
            .find(|&j| matches[j].activated)
    }

    /// The next activated match below `i` with the same output row.
    fn find_next_smaller(&self, i: usize, matches: &[Match]) -> Option<usize> {
        let row = matches[i].ix_output;
        (0..i)
            .rev()
            .take_while(|&j| matches[j].ix_output == row)
            .find(|&j| matches[j].activated)
    }

    /// MEDIAN activation. The pointer stores the greater of the middle pair
    /// by convention; with an odd count it stores the middle match itself.
    fn activate_median(&mut self, i: usize, matches: &mut [Match]) {
        let r = matches[i].ix_output as usize;
        self.count[r] += 1.0;

        let Some(ptr) = self.sample_ptr[r] else {
            self.sample_ptr[r] = Some(i as u32);
            self.y[r] = matches[i].value;
            return;
        };
        let ptr = ptr as usize;

        if (self.count[r] as i64) % 2 == 0 {
            // Even now, was odd: the pair straddles the old middle.
            let (greater, smaller) = if i > ptr {
                let g = self
                    .find_next_greater(ptr, matches)
                    .unwrap_or(ptr);
                self.sample_ptr[r] = Some(g as u32);
                (g, ptr)
            } else {
                // The new match lands below; the old middle stays the
                // greater of the pair.
                let s = self.find_next_smaller(ptr, matches).unwrap_or(ptr);
                (ptr, s)
            };
            self.y[r] = (matches[greater].value + matches[smaller].value) / 2.0;
        } else {
            // Odd now, was even: collapse the pair to a single middle.
            let mid = if i < ptr {
                let s = self.find_next_smaller(ptr, matches).unwrap_or(ptr);
                self.sample_ptr[r] = Some(s as u32);
                s
            } else {
                ptr
            };
            self.y[r] = matches[mid].value;
        }
    }

    /// MEDIAN deactivation. Mirror of [`Self::activate_median`].
    fn deactivate_median(&mut self, i: usize, matches: &mut [Match]) {
        let r = matches[i].ix_output as usize;
        self.count[r] -= 1.0;

        if self.count[r] < 0.5 {
            self.sample_ptr[r] = None;
            self.y[r] = 0.0;
            return;
        }

        let ptr = match self.sample_ptr[r] {
            Some(p) => p as usize,
            None => {
                debug_assert!(false, "median pointer lost");
                return;
            }
        };

        if (self.count[r] as i64) % 2 == 0 {
            // Even now, was odd.
            let (greater, smaller) = if i < ptr {
                let g = self.find_next_greater(ptr, matches).unwrap_or(ptr);
                self.sample_ptr[r] = Some(g as u32);
                (g, ptr)
            } else if i > ptr {
                let s = self.find_next_smaller(ptr, matches).unwrap_or(ptr);
                (ptr, s)
            } else {
                // The middle itself went away; both pointers step outward.
                let g = self.find_next_greater(ptr, matches).unwrap_or(ptr);
                let s = self.find_next_smaller(ptr, matches).unwrap_or(ptr);
                self.sample_ptr[r] = Some(g as u32);
                (g, s)
            };
            self.y[r] = (matches[greater].value + matches[smaller].value) / 2.0;
        } else {
            // Odd now, was even: the pair collapses to its smaller member
            // unless the deactivated match sat below the stored pointer.
            let mid = if i >= ptr {
                let s = self.find_next_smaller(ptr, matches).unwrap_or(ptr);
                self.sample_ptr[r] = Some(s as u32);
                s
            } else {
                ptr
            };
            self.y[r] = matches[mid].value;
        }
    }
}

#[inline]
fn project_nan(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}
