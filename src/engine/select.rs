//! Feature selection by R².
//!
//! Candidates are scored against every target over a deterministic sample
//! of the population; each feature keeps its best R² across targets and the
//! top `num_features` survive, ties broken by lower feature index.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::matrix::FeatureMatrix;

/// Fixed sampling seed: fit is reproducible across runs and machines.
const SAMPLING_SEED: u64 = 0x6665617470726f70;

/// Candidate features are scored in batches of this many columns.
pub const SCORING_BATCH_SIZE: usize = 100;

/// Draw the fit-time sample: every row is kept independently with
/// probability `sampling_factor`. Falls back to the full population when
/// the draw comes up empty.
pub fn sample_rows(nrows: usize, sampling_factor: f64) -> Vec<usize> {
    if sampling_factor >= 1.0 {
        return (0..nrows).collect();
    }

    let mut rng = StdRng::seed_from_u64(SAMPLING_SEED);
    let rows: Vec<usize> = (0..nrows)
        .filter(|_| rng.r#gen::<f64>() < sampling_factor)
        .collect();

    if rows.is_empty() {
        (0..nrows).collect()
    } else {
        rows
    }
}

/// R² (squared Pearson correlation) between a feature column and a target
/// sampled at `rows`. Degenerate inputs (constant columns, NaN) score 0.
pub fn r_squared(feature: &[f64], target: &[f64], rows: &[usize]) -> f64 {
    debug_assert_eq!(feature.len(), rows.len());

    let n = rows.len() as f64;
    if rows.is_empty() {
        return 0.0;
    }

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_yy = 0.0;
    let mut sum_xy = 0.0;

    for (i, &row) in rows.iter().enumerate() {
        let x = feature[i];
        let y = target[row];
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_yy += y * y;
        sum_xy += x * y;
    }

    let cov = n * sum_xy - sum_x * sum_y;
    let var_x = n * sum_xx - sum_x * sum_x;
    let var_y = n * sum_yy - sum_y * sum_y;

    let r2 = (cov * cov) / (var_x * var_y);
    if r2.is_nan() || r2.is_infinite() {
        0.0
    } else {
        r2
    }
}

/// Score one batch of built candidate columns: for each column, the best
/// R² across all targets.
///
/// `matrix` holds the batch's columns over the sampled rows (row `i` of the
/// matrix is `rows[i]` of the population).
pub fn score_batch(matrix: &FeatureMatrix, targets: &[&[f64]], rows: &[usize]) -> Vec<f64> {
    (0..matrix.ncols())
        .map(|col| {
            let feature = matrix.column(col);
            targets
                .iter()
                .map(|target| r_squared(feature, target, rows))
                .fold(0.0, f64::max)
        })
        .collect()
}

/// Indices of the `num_features` best-scoring candidates, in ascending
/// index order. Identity when there are no more candidates than slots.
/// NaN scores count as 0; ties break toward the lower index.
pub fn select_top(scores: &[f64], num_features: usize) -> Vec<usize> {
    if scores.len() <= num_features {
        return (0..scores.len()).collect();
    }

    let sanitize = |s: f64| if s.is_nan() { 0.0 } else { s };

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        sanitize(scores[b])
            .total_cmp(&sanitize(scores[a]))
            .then(a.cmp(&b))
    });
    order.truncate(num_features);
    order.sort_unstable();
    order
}
