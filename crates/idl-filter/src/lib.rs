// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Dual forward/backward predictor denoising filter.
//!
//! Every sample is replaced by a blend of running-mean predictions taken from
//! the samples before it and the samples after it. Each predictor is weighted
//! by the inverse of its recent squared prediction error, so at a jump the
//! predictor that has not yet crossed the jump dominates and the edge stays
//! sharp.

use idl_core::IdealizeError;

/// Squared-error sums below this are treated as boundary artifacts.
pub const WEIGHT_CLAMP_FLOOR: f64 = 1.0e-20;
/// Replacement for squared-error sums below [`WEIGHT_CLAMP_FLOOR`].
pub const WEIGHT_CLAMP_REPLACEMENT: f64 = 1.0;

const DEFAULT_WINDOW_LENGTHS: [usize; 3] = [4, 8, 16];
const DEFAULT_WEIGHT_EXPONENT: f64 = 2.0;
const DEFAULT_WEIGHT_WINDOW: usize = 10;

/// Configuration for [`AdaptiveFilter`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveFilterConfig {
    /// Running-mean widths, one forward and one backward predictor per entry.
    pub window_lengths: Vec<usize>,
    /// Exponent `p` in `weight = error_sum^-p`.
    pub weight_exponent: f64,
    /// Number of samples summed when scoring a predictor.
    pub weight_window: usize,
    pub apriori_forward_weights: Option<Vec<f64>>,
    pub apriori_backward_weights: Option<Vec<f64>>,
}

impl Default for AdaptiveFilterConfig {
    fn default() -> Self {
        Self {
            window_lengths: DEFAULT_WINDOW_LENGTHS.to_vec(),
            weight_exponent: DEFAULT_WEIGHT_EXPONENT,
            weight_window: DEFAULT_WEIGHT_WINDOW,
            apriori_forward_weights: None,
            apriori_backward_weights: None,
        }
    }
}

impl AdaptiveFilterConfig {
    fn validate(&self) -> Result<(), IdealizeError> {
        if self.window_lengths.is_empty() {
            return Err(IdealizeError::invalid_input(
                "AdaptiveFilterConfig.window_lengths must contain >= 1 width",
            ));
        }
        if let Some(idx) = self.window_lengths.iter().position(|&w| w == 0) {
            return Err(IdealizeError::invalid_input(format!(
                "AdaptiveFilterConfig.window_lengths[{idx}] must be >= 1; got 0"
            )));
        }
        if !self.weight_exponent.is_finite() || self.weight_exponent < 0.0 {
            return Err(IdealizeError::invalid_input(format!(
                "AdaptiveFilterConfig.weight_exponent must be finite and >= 0.0; got {}",
                self.weight_exponent
            )));
        }
        if self.weight_window == 0 {
            return Err(IdealizeError::invalid_input(
                "AdaptiveFilterConfig.weight_window must be >= 1; got 0",
            ));
        }
        validate_apriori(
            "apriori_forward_weights",
            self.apriori_forward_weights.as_deref(),
            self.window_lengths.len(),
        )?;
        validate_apriori(
            "apriori_backward_weights",
            self.apriori_backward_weights.as_deref(),
            self.window_lengths.len(),
        )
    }

    fn resolved_apriori(weights: Option<&[f64]>, n_predictors: usize) -> Vec<f64> {
        match weights {
            Some(weights) => weights.to_vec(),
            None => vec![1.0 / n_predictors as f64; n_predictors],
        }
    }
}

fn validate_apriori(
    name: &str,
    weights: Option<&[f64]>,
    n_predictors: usize,
) -> Result<(), IdealizeError> {
    let Some(weights) = weights else {
        return Ok(());
    };
    if weights.len() != n_predictors {
        return Err(IdealizeError::invalid_input(format!(
            "AdaptiveFilterConfig.{name} length mismatch: got {}, expected {n_predictors}",
            weights.len()
        )));
    }
    if let Some((idx, w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(IdealizeError::invalid_input(format!(
            "AdaptiveFilterConfig.{name}[{idx}] must be finite and >= 0.0; got {w}"
        )));
    }
    Ok(())
}

/// Forward/backward predictor blending filter.
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveFilter {
    config: AdaptiveFilterConfig,
    forward_apriori: Vec<f64>,
    backward_apriori: Vec<f64>,
}

impl AdaptiveFilter {
    pub fn new(config: AdaptiveFilterConfig) -> Result<Self, IdealizeError> {
        config.validate()?;
        let n_predictors = config.window_lengths.len();
        let forward_apriori = AdaptiveFilterConfig::resolved_apriori(
            config.apriori_forward_weights.as_deref(),
            n_predictors,
        );
        let backward_apriori = AdaptiveFilterConfig::resolved_apriori(
            config.apriori_backward_weights.as_deref(),
            n_predictors,
        );
        Ok(Self {
            config,
            forward_apriori,
            backward_apriori,
        })
    }

    pub fn config(&self) -> &AdaptiveFilterConfig {
        &self.config
    }

    /// Filters `signal`; the output always has the input's length.
    pub fn apply(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return vec![];
        }

        let prefix = prefix_sums(signal);
        let mut numerator = vec![0.0; n];
        let mut denominator = vec![0.0; n];

        for (p, &width) in self.config.window_lengths.iter().enumerate() {
            let forward = forward_prediction(signal, &prefix, width);
            let backward = backward_prediction(signal, &prefix, width);

            let forward_scores = trailing_error_sums(signal, &forward, self.config.weight_window);
            let backward_scores = leading_error_sums(signal, &backward, self.config.weight_window);

            for i in 0..n {
                let wf = predictor_weight(forward_scores[i], self.config.weight_exponent)
                    * self.forward_apriori[p];
                let wb = predictor_weight(backward_scores[i], self.config.weight_exponent)
                    * self.backward_apriori[p];
                numerator[i] += wf * forward[i] + wb * backward[i];
                denominator[i] += wf + wb;
            }
        }

        numerator
            .iter()
            .zip(&denominator)
            .zip(signal)
            .map(|((&num, &den), &raw)| {
                if den > 0.0 && den.is_finite() {
                    num / den
                } else {
                    raw
                }
            })
            .collect()
    }
}

fn prefix_sums(values: &[f64]) -> Vec<f64> {
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0);
    let mut running = 0.0;
    for &v in values {
        running += v;
        prefix.push(running);
    }
    prefix
}

/// Mean of the preceding `min(i, width)` samples; `x[0]` at the first sample.
fn forward_prediction(signal: &[f64], prefix: &[f64], width: usize) -> Vec<f64> {
    (0..signal.len())
        .map(|i| {
            if i == 0 {
                return signal[0];
            }
            let k = i.min(width);
            (prefix[i] - prefix[i - k]) / k as f64
        })
        .collect()
}

/// Mean of the following `min(n-1-i, width)` samples; `x[n-1]` at the last sample.
fn backward_prediction(signal: &[f64], prefix: &[f64], width: usize) -> Vec<f64> {
    let n = signal.len();
    (0..n)
        .map(|i| {
            if i + 1 == n {
                return signal[n - 1];
            }
            let k = (n - 1 - i).min(width);
            (prefix[i + 1 + k] - prefix[i + 1]) / k as f64
        })
        .collect()
}

fn squared_error_prefix(signal: &[f64], prediction: &[f64]) -> Vec<f64> {
    let errors: Vec<f64> = signal
        .iter()
        .zip(prediction)
        .map(|(x, p)| (x - p) * (x - p))
        .collect();
    prefix_sums(&errors)
}

/// Sum of squared error over `[i - window + 1, i]`, clipped at the start.
fn trailing_error_sums(signal: &[f64], prediction: &[f64], window: usize) -> Vec<f64> {
    let prefix = squared_error_prefix(signal, prediction);
    (0..signal.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            (prefix[i + 1] - prefix[start]).max(0.0)
        })
        .collect()
}

/// Sum of squared error over `[i, i + window - 1]`, clipped at the end.
fn leading_error_sums(signal: &[f64], prediction: &[f64], window: usize) -> Vec<f64> {
    let n = signal.len();
    let prefix = squared_error_prefix(signal, prediction);
    (0..n)
        .map(|i| {
            let end = (i + window).min(n);
            (prefix[end] - prefix[i]).max(0.0)
        })
        .collect()
}

fn predictor_weight(error_sum: f64, exponent: f64) -> f64 {
    let base = if error_sum < WEIGHT_CLAMP_FLOOR {
        WEIGHT_CLAMP_REPLACEMENT
    } else {
        error_sum
    };
    base.powf(-exponent)
}

#[cfg(test)]
mod tests {
    use super::{
        AdaptiveFilter, AdaptiveFilterConfig, WEIGHT_CLAMP_REPLACEMENT, backward_prediction,
        forward_prediction, predictor_weight, prefix_sums,
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn mse(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>() / a.len() as f64
    }

    #[test]
    fn predictions_shrink_windows_at_boundaries() {
        let signal = [1.0, 2.0, 3.0, 4.0, 5.0];
        let prefix = prefix_sums(&signal);

        let forward = forward_prediction(&signal, &prefix, 2);
        assert_eq!(forward, vec![1.0, 1.0, 1.5, 2.5, 3.5]);

        let backward = backward_prediction(&signal, &prefix, 2);
        assert_eq!(backward, vec![2.5, 3.5, 4.5, 5.0, 5.0]);
    }

    #[test]
    fn tiny_error_sums_are_clamped_before_exponentiation() {
        assert_eq!(predictor_weight(0.0, 3.0), WEIGHT_CLAMP_REPLACEMENT);
        assert_eq!(predictor_weight(1.0e-30, 5.0), WEIGHT_CLAMP_REPLACEMENT);
        assert!((predictor_weight(0.25, 1.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn output_length_matches_input_and_empty_is_empty() {
        let filter = AdaptiveFilter::new(AdaptiveFilterConfig::default())
            .expect("default config should be valid");
        assert!(filter.apply(&[]).is_empty());
        assert_eq!(filter.apply(&[1.0]).len(), 1);
        assert_eq!(filter.apply(&[0.5; 37]).len(), 37);
    }

    #[test]
    fn constant_signal_passes_through() {
        let filter = AdaptiveFilter::new(AdaptiveFilterConfig::default())
            .expect("default config should be valid");
        let signal = vec![-2.5; 50];
        for value in filter.apply(&signal) {
            assert!((value + 2.5).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_backward_apriori_leaves_forward_predictor_only() {
        let filter = AdaptiveFilter::new(AdaptiveFilterConfig {
            window_lengths: vec![1],
            weight_exponent: 1.0,
            weight_window: 2,
            apriori_forward_weights: None,
            apriori_backward_weights: Some(vec![0.0]),
        })
        .expect("config should be valid");

        assert_eq!(filter.apply(&[1.0, 2.0, 3.0, 4.0]), vec![1.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn all_zero_apriori_passes_raw_samples_through() {
        let filter = AdaptiveFilter::new(AdaptiveFilterConfig {
            window_lengths: vec![2],
            apriori_forward_weights: Some(vec![0.0]),
            apriori_backward_weights: Some(vec![0.0]),
            ..AdaptiveFilterConfig::default()
        })
        .expect("config should be valid");
        assert_eq!(filter.apply(&[3.0, 1.0, 2.0]), vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn noisy_steps_are_denoised_without_smearing_edges() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let noise = Normal::new(0.0, 0.05).expect("normal should construct");
        let clean: Vec<f64> = (0..400)
            .map(|i| if (i / 100) % 2 == 0 { 0.0 } else { 1.0 })
            .collect();
        let noisy: Vec<f64> = clean.iter().map(|c| c + noise.sample(&mut rng)).collect();

        let filter = AdaptiveFilter::new(AdaptiveFilterConfig::default())
            .expect("default config should be valid");
        let filtered = filter.apply(&noisy);

        assert!(mse(&filtered, &clean) < 0.5 * mse(&noisy, &clean));
        assert!(filtered[102] > 0.7, "edge smeared: {}", filtered[102]);
        assert!(filtered[202] < 0.3, "edge smeared: {}", filtered[202]);
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let err = AdaptiveFilter::new(AdaptiveFilterConfig {
            window_lengths: vec![],
            ..AdaptiveFilterConfig::default()
        })
        .expect_err("empty widths must fail");
        assert!(err.to_string().contains("window_lengths"));

        let err = AdaptiveFilter::new(AdaptiveFilterConfig {
            window_lengths: vec![4, 0],
            ..AdaptiveFilterConfig::default()
        })
        .expect_err("zero width must fail");
        assert!(err.to_string().contains("window_lengths[1]"));

        let err = AdaptiveFilter::new(AdaptiveFilterConfig {
            weight_exponent: f64::NAN,
            ..AdaptiveFilterConfig::default()
        })
        .expect_err("nan exponent must fail");
        assert!(err.to_string().contains("weight_exponent"));

        let err = AdaptiveFilter::new(AdaptiveFilterConfig {
            weight_window: 0,
            ..AdaptiveFilterConfig::default()
        })
        .expect_err("zero weight window must fail");
        assert!(err.to_string().contains("weight_window"));

        let err = AdaptiveFilter::new(AdaptiveFilterConfig {
            apriori_forward_weights: Some(vec![1.0]),
            ..AdaptiveFilterConfig::default()
        })
        .expect_err("apriori length mismatch must fail");
        assert!(err.to_string().contains("apriori_forward_weights length mismatch"));

        let err = AdaptiveFilter::new(AdaptiveFilterConfig {
            window_lengths: vec![2],
            apriori_backward_weights: Some(vec![-1.0]),
            ..AdaptiveFilterConfig::default()
        })
        .expect_err("negative apriori must fail");
        assert!(err.to_string().contains("apriori_backward_weights[0]"));
    }
}
