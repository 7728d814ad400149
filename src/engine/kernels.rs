//! One-shot aggregation kernels.
//!
//! FIRST, LAST, AVG TIME BETWEEN and TREND are evaluated in a single pass
//! over the prepared matches of one population row — they depend on the
//! peripheral time stamps rather than on incremental set membership, so
//! the activate/deactivate machinery buys nothing for them.
//!
//! All kernels skip matches whose value or time stamp is null and return
//! 0.0 for degenerate inputs (no matches, no time variance).

use crate::engine::matches::Match;
use crate::frame::is_null;

/// Value of the match with the smallest time stamp. Ties keep the earliest
/// match in slice order.
pub fn first(matches: &[Match], ts: &[f64]) -> f64 {
    let mut best: Option<(f64, f64)> = None;
    for m in matches {
        let t = ts[m.ix_input as usize];
        if is_null(t) || is_null(m.value) {
            continue;
        }
        match best {
            Some((best_t, _)) if best_t <= t => {}
            _ => best = Some((t, m.value)),
        }
    }
    best.map(|(_, v)| v).unwrap_or(0.0)
}

/// Value of the match with the largest time stamp. Ties keep the earliest
/// match in slice order.
pub fn last(matches: &[Match], ts: &[f64]) -> f64 {
    let mut best: Option<(f64, f64)> = None;
    for m in matches {
        let t = ts[m.ix_input as usize];
        if is_null(t) || is_null(m.value) {
            continue;
        }
        match best {
            Some((best_t, _)) if best_t >= t => {}
            _ => best = Some((t, m.value)),
        }
    }
    best.map(|(_, v)| v).unwrap_or(0.0)
}

/// Average gap between consecutive time stamps: `(max − min) / (n − 1)`
/// over the matches' values (which carry the peripheral time stamps).
/// 0.0 with fewer than two non-null matches.
pub fn avg_time_between(matches: &[Match]) -> f64 {
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    let mut n = 0usize;
    for m in matches {
        if is_null(m.value) {
            continue;
        }
        min = min.min(m.value);
        max = max.max(m.value);
        n += 1;
    }
    if n < 2 {
        return 0.0;
    }
    (max - min) / (n as f64 - 1.0)
}

/// Ordinary least-squares trend of value against time stamp, evaluated at
/// the population row's time stamp.
///
/// With no time variance (or a single match) the slope degenerates and the
/// mean value is returned; with no matches, 0.0.
pub fn trend(matches: &[Match], ts: &[f64], population_ts: f64) -> f64 {
    let mut n = 0.0;
    let mut sum_t = 0.0;
    let mut sum_v = 0.0;
    let mut sum_tt = 0.0;
    let mut sum_tv = 0.0;

    for m in matches {
        let t = ts[m.ix_input as usize];
        if is_null(t) || is_null(m.value) {
            continue;
        }
        n += 1.0;
        sum_t += t;
        sum_v += m.value;
        sum_tt += t * t;
        sum_tv += t * m.value;
    }

    if n < 0.5 {
        return 0.0;
    }

    let mean_t = sum_t / n;
    let mean_v = sum_v / n;
    let var_t = sum_tt / n - mean_t * mean_t;

    if var_t <= 0.0 || is_null(var_t) {
        return mean_v;
    }

    let slope = (sum_tv / n - mean_t * mean_v) / var_t;
    let predicted = mean_v + slope * (population_ts - mean_t);
    if is_null(predicted) { 0.0 } else { predicted }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(values: &[f64]) -> Vec<Match> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let mut m = Match::new(0, i as u32);
                m.value = v;
                m
            })
            .collect()
    }

    #[test]
    fn test_first_and_last() {
        let m = matches(&[10.0, 20.0, 30.0]);
        let ts = [5.0, 1.0, 3.0];
        assert_eq!(first(&m, &ts), 20.0);
        assert_eq!(last(&m, &ts), 10.0);
    }

    #[test]
    fn test_first_skips_null_ts() {
        let m = matches(&[10.0, 20.0]);
        let ts = [f64::NAN, 4.0];
        assert_eq!(first(&m, &ts), 20.0);
        assert_eq!(last(&m, &ts), 20.0);
    }

    #[test]
    fn test_first_empty_is_zero() {
        assert_eq!(first(&[], &[]), 0.0);
        assert_eq!(last(&[], &[]), 0.0);
    }

    #[test]
    fn test_avg_time_between() {
        // Time stamps 1, 4, 9: span 8 over 2 gaps → 4.
        let m = matches(&[1.0, 4.0, 9.0]);
        assert_eq!(avg_time_between(&m), 4.0);
    }

    #[test]
    fn test_avg_time_between_degenerate() {
        assert_eq!(avg_time_between(&matches(&[5.0])), 0.0);
        assert_eq!(avg_time_between(&matches(&[])), 0.0);
        assert_eq!(avg_time_between(&matches(&[f64::NAN, 3.0])), 0.0);
    }

    #[test]
    fn test_trend_exact_line() {
        // value = 2·t + 1 over t = 1..4; prediction at t = 10 is 21.
        let m = matches(&[3.0, 5.0, 7.0, 9.0]);
        let ts = [1.0, 2.0, 3.0, 4.0];
        assert!((trend(&m, &ts, 10.0) - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_no_time_variance_returns_mean() {
        let m = matches(&[2.0, 4.0]);
        let ts = [7.0, 7.0];
        assert!((trend(&m, &ts, 100.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_trend_empty_is_zero() {
        assert_eq!(trend(&[], &[], 5.0), 0.0);
    }
}
