//! Hyperparameters controlling feature enumeration, selection and build.
//!
//! All knobs are plain serde-serializable values with documented defaults.
//! [`Hyperparameters::validate`] rejects inconsistent combinations before
//! fit starts; nothing downstream re-checks them.

use serde::{Deserialize, Serialize};

use crate::engine::feature::AggKind;
use crate::error::{RelPropError, Result};

/// Loss function of the downstream predictor. Only used to distinguish
/// regression from classification when reporting scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    /// Squared loss (regression).
    #[default]
    Square,
    /// Cross-entropy loss (classification).
    CrossEntropy,
}

/// Hyperparameters for a [`FeatureEngine`](crate::engine::FeatureEngine).
///
/// The defaults mirror a conservative production configuration: all
/// aggregations enabled, 200 features kept, automatic thread count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Aggregation kinds considered during enumeration.
    pub aggregations: Vec<AggKind>,

    /// Number of features kept after selection.
    pub num_features: usize,

    /// Worker thread count; `<= 0` selects `max(2, cores / 2)`.
    pub num_threads: i64,

    /// Fraction of population rows drawn for fit-time scoring, in `(0, 1]`.
    /// The draw is deterministic (fixed seed) so fit is reproducible.
    pub sampling_factor: f64,

    /// Number of most-frequent categories used as condition literals per
    /// categorical column. `0` disables category conditions.
    pub n_most_frequent: usize,

    /// Width of one lag window in seconds. Must be paired with `max_lag`.
    pub delta_t: f64,

    /// Number of lag windows generated per temporal join. Must be paired
    /// with `delta_t`.
    pub max_lag: usize,

    /// Loss function of the downstream predictor.
    pub loss_function: LossFunction,

    /// Minimum document frequency for the text-aware variants. Validated
    /// and persisted; vocabulary learning itself happens outside this crate.
    pub min_df: usize,

    /// Vocabulary size cap for the text-aware variants.
    pub vocab_size: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            aggregations: AggKind::all().to_vec(),
            num_features: 200,
            num_threads: 0,
            sampling_factor: 1.0,
            n_most_frequent: 0,
            delta_t: 0.0,
            max_lag: 0,
            loss_function: LossFunction::Square,
            min_df: 30,
            vocab_size: 500,
        }
    }
}

impl Hyperparameters {
    /// Check the hyperparameters for internal consistency.
    ///
    /// Called once at the start of fit; all downstream code may assume a
    /// validated configuration.
    pub fn validate(&self) -> Result<()> {
        if self.aggregations.is_empty() {
            return Err(RelPropError::InvalidHyperparameters(
                "the aggregation list must not be empty".to_string(),
            ));
        }

        if self.num_features == 0 {
            return Err(RelPropError::InvalidHyperparameters(
                "num_features must be at least 1".to_string(),
            ));
        }

        if !(self.sampling_factor > 0.0 && self.sampling_factor <= 1.0) {
            return Err(RelPropError::InvalidHyperparameters(format!(
                "sampling_factor must be in (0, 1], got {}",
                self.sampling_factor
            )));
        }

        if self.delta_t < 0.0 {
            return Err(RelPropError::InvalidHyperparameters(format!(
                "delta_t must be >= 0, got {}",
                self.delta_t
            )));
        }

        // max_lag and delta_t come as a pair: one without the other cannot
        // define a window.
        if self.max_lag > 0 && self.delta_t <= 0.0 {
            return Err(RelPropError::InvalidHyperparameters(
                "if you pass a max_lag, you must also pass a delta_t that is greater than 0"
                    .to_string(),
            ));
        }

        if self.delta_t > 0.0 && self.max_lag == 0 {
            return Err(RelPropError::InvalidHyperparameters(
                "if you pass a delta_t, you must also pass a max_lag that is greater than 0"
                    .to_string(),
            ));
        }

        if self.vocab_size > 0 && self.min_df == 0 {
            return Err(RelPropError::InvalidHyperparameters(
                "min_df must be at least 1 when vocab_size is set".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the downstream predictor is a classifier.
    pub fn is_classification(&self) -> bool {
        self.loss_function == LossFunction::CrossEntropy
    }

    /// Whether COUNT is among the enabled aggregations.
    pub fn has_count(&self) -> bool {
        self.aggregations.contains(&AggKind::Count)
    }

    /// Resolve the effective worker thread count.
    ///
    /// `num_threads <= 0` means auto: half the hardware threads, at least 2.
    pub fn effective_num_threads(&self) -> usize {
        if self.num_threads <= 0 {
            (num_cpus::get() / 2).max(2)
        } else {
            self.num_threads as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(Hyperparameters::default().validate().is_ok());
    }

    #[test]
    fn test_empty_aggregations_rejected() {
        let hyp = Hyperparameters {
            aggregations: vec![],
            ..Default::default()
        };
        assert!(hyp.validate().is_err());
    }

    #[test]
    fn test_lag_window_coupling() {
        let hyp = Hyperparameters {
            max_lag: 3,
            delta_t: 0.0,
            ..Default::default()
        };
        assert!(hyp.validate().is_err());

        let hyp = Hyperparameters {
            max_lag: 0,
            delta_t: 60.0,
            ..Default::default()
        };
        assert!(hyp.validate().is_err());

        let hyp = Hyperparameters {
            max_lag: 3,
            delta_t: 60.0,
            ..Default::default()
        };
        assert!(hyp.validate().is_ok());
    }

    #[test]
    fn test_sampling_factor_bounds() {
        for bad in [0.0, -0.5, 1.5] {
            let hyp = Hyperparameters {
                sampling_factor: bad,
                ..Default::default()
            };
            assert!(hyp.validate().is_err(), "sampling_factor {bad} accepted");
        }

        let hyp = Hyperparameters {
            sampling_factor: 1.0,
            ..Default::default()
        };
        assert!(hyp.validate().is_ok());
    }

    #[test]
    fn test_effective_num_threads() {
        let hyp = Hyperparameters {
            num_threads: 4,
            ..Default::default()
        };
        assert_eq!(hyp.effective_num_threads(), 4);

        let hyp = Hyperparameters {
            num_threads: -1,
            ..Default::default()
        };
        assert!(hyp.effective_num_threads() >= 2);
    }

    #[test]
    fn test_serde_roundtrip() {
        let hyp = Hyperparameters {
            num_features: 50,
            n_most_frequent: 5,
            max_lag: 2,
            delta_t: 3600.0,
            loss_function: LossFunction::CrossEntropy,
            ..Default::default()
        };
        let json = serde_json::to_string(&hyp).unwrap();
        let back: Hyperparameters = serde_json::from_str(&json).unwrap();
        assert_eq!(hyp, back);
    }
}
