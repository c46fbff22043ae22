// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use idl_core::{IdealizeError, validate_finite};

/// Result of [`threshold_crossing`].
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdOutcome {
    pub idealization: Vec<f64>,
    /// Amplitudes, descending.
    pub amplitudes: Vec<f64>,
    /// Thresholds actually applied, descending, `amplitudes.len() - 1` of them.
    pub thresholds: Vec<f64>,
    pub warnings: Vec<String>,
}

fn sort_descending(values: &mut [f64]) {
    values.sort_by(|a, b| b.total_cmp(a));
}

fn midpoints(amplitudes: &[f64]) -> Vec<f64> {
    amplitudes.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
}

/// Maps every sample to one of a fixed set of amplitudes.
///
/// A sample above `thresholds[0]` takes `amplitudes[0]`; a sample at or below
/// `thresholds[i]` falls to `amplitudes[i + 1]`. Thresholds that are absent or
/// do not number `amplitudes.len() - 1` are replaced by the midpoints between
/// consecutive amplitudes.
pub fn threshold_crossing(
    signal: &[f64],
    amplitudes: &[f64],
    thresholds: Option<&[f64]>,
) -> Result<ThresholdOutcome, IdealizeError> {
    if amplitudes.is_empty() {
        return Err(IdealizeError::invalid_input(
            "threshold crossing requires >= 1 amplitude",
        ));
    }
    validate_finite("amplitudes", amplitudes)?;
    validate_finite("signal", signal)?;

    let mut amplitudes = amplitudes.to_vec();
    sort_descending(&mut amplitudes);

    let mut warnings = Vec::new();
    let thresholds = match thresholds {
        Some(supplied) if supplied.len() == amplitudes.len() - 1 => {
            validate_finite("thresholds", supplied)?;
            let mut supplied = supplied.to_vec();
            sort_descending(&mut supplied);
            supplied
        }
        Some(supplied) => {
            let message = format!(
                "expected {} thresholds for {} amplitudes, got {}; using midpoints",
                amplitudes.len() - 1,
                amplitudes.len(),
                supplied.len()
            );
            tracing::warn!(
                amplitudes = amplitudes.len(),
                thresholds = supplied.len(),
                "{message}"
            );
            warnings.push(message);
            midpoints(&amplitudes)
        }
        None => midpoints(&amplitudes),
    };

    let idealization = signal
        .iter()
        .map(|&x| {
            let mut band = 0;
            for (idx, &threshold) in thresholds.iter().enumerate() {
                if x > threshold {
                    break;
                }
                band = idx + 1;
            }
            amplitudes[band]
        })
        .collect();

    Ok(ThresholdOutcome {
        idealization,
        amplitudes,
        thresholds,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::threshold_crossing;

    #[test]
    fn assigns_nearest_amplitude_with_midpoints() {
        let signal = [0.1, 0.9, 2.2, -0.4, 1.6];
        let outcome = threshold_crossing(&signal, &[0.0, 1.0, 2.0], None).expect("valid");
        assert_eq!(outcome.amplitudes, vec![2.0, 1.0, 0.0]);
        assert_eq!(outcome.thresholds, vec![1.5, 0.5]);
        assert_eq!(outcome.idealization, vec![0.0, 1.0, 2.0, 0.0, 2.0]);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn two_level_signal_on_its_own_amplitudes_is_unchanged() {
        let signal = [1.0, 1.0, 2.0, 1.0, 1.0, 1.0];
        let outcome = threshold_crossing(&signal, &[1.0, 2.0], None).expect("valid");
        assert_eq!(outcome.thresholds, vec![1.5]);
        assert_eq!(outcome.idealization, signal.to_vec());
    }

    #[test]
    fn sample_on_a_threshold_goes_to_the_lower_band() {
        let outcome =
            threshold_crossing(&[1.5, 0.5, 0.50001], &[0.0, 1.0, 2.0], None).expect("valid");
        assert_eq!(outcome.idealization, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn supplied_thresholds_are_sorted_and_used() {
        let outcome = threshold_crossing(&[0.2, 0.35, 1.9], &[0.0, 1.0, 2.0], Some(&[0.3, 1.8]))
            .expect("valid");
        assert_eq!(outcome.thresholds, vec![1.8, 0.3]);
        assert_eq!(outcome.idealization, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn mismatched_thresholds_fall_back_with_warning() {
        let outcome =
            threshold_crossing(&[0.2, 0.8], &[0.0, 1.0], Some(&[0.1, 0.2, 0.3])).expect("valid");
        assert_eq!(outcome.thresholds, vec![0.5]);
        assert_eq!(outcome.idealization, vec![0.0, 1.0]);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("using midpoints"));
    }

    #[test]
    fn single_amplitude_gives_constant_output() {
        let outcome = threshold_crossing(&[-3.0, 0.0, 7.0], &[1.25], None).expect("valid");
        assert_eq!(outcome.idealization, vec![1.25; 3]);
        assert!(outcome.thresholds.is_empty());
    }

    #[test]
    fn rejects_empty_or_non_finite_amplitudes() {
        assert!(threshold_crossing(&[0.0], &[], None).is_err());
        let err = threshold_crossing(&[0.0], &[0.0, f64::NAN], None).expect_err("nan amplitude");
        assert!(err.to_string().contains("amplitudes must be finite"));
    }
}
