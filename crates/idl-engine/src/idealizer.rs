// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::events::extract_events;
use crate::interpolate::interpolate;
use crate::resolution::apply_resolution;
use crate::threshold::threshold_crossing;
use idl_core::{Diagnostics, Event, ExecutionContext, IdealizeError, TraceView, validate_finite};
use idl_disc::{DiscConfig, run_disc};
use rand::Rng;
use std::time::Instant;

/// How a trace is turned into discrete levels.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Clone, Debug, PartialEq)]
pub enum Strategy {
    /// Fixed amplitudes separated by thresholds, optionally on an upsampled trace.
    ThresholdCrossing {
        amplitudes: Vec<f64>,
        thresholds: Option<Vec<f64>>,
        interpolation_factor: usize,
    },
    /// Automatic segmentation and state detection.
    Disc(DiscConfig),
}

/// Full parameter set for one idealization.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct IdealizationParams {
    pub strategy: Strategy,
    /// Minimum event duration, in time units; `None` disables merging.
    pub resolution: Option<f64>,
    /// Seeds the merge-direction coin of resolution enforcement.
    pub seed: u64,
}

impl Default for IdealizationParams {
    fn default() -> Self {
        Self {
            strategy: Strategy::Disc(DiscConfig::default()),
            resolution: None,
            seed: 0,
        }
    }
}

impl IdealizationParams {
    pub fn validate(&self) -> Result<(), IdealizeError> {
        match &self.strategy {
            Strategy::ThresholdCrossing {
                amplitudes,
                thresholds,
                interpolation_factor,
            } => {
                if amplitudes.is_empty() {
                    return Err(IdealizeError::invalid_input(
                        "ThresholdCrossing.amplitudes must not be empty",
                    ));
                }
                validate_finite("amplitudes", amplitudes)?;
                if let Some(thresholds) = thresholds {
                    validate_finite("thresholds", thresholds)?;
                }
                if *interpolation_factor == 0 {
                    return Err(IdealizeError::invalid_input(
                        "ThresholdCrossing.interpolation_factor must be >= 1; got 0",
                    ));
                }
            }
            Strategy::Disc(config) => config.validate()?,
        }
        if let Some(resolution) = self.resolution
            && !resolution.is_finite()
        {
            return Err(IdealizeError::invalid_input(format!(
                "IdealizationParams.resolution must be finite; got {resolution}"
            )));
        }
        Ok(())
    }
}

/// Idealization of one trace with its time base and event table.
#[derive(Clone, Debug, PartialEq)]
pub struct Idealized {
    pub idealization: Vec<f64>,
    pub time: Vec<f64>,
    pub events: Vec<Event>,
    pub diagnostics: Diagnostics,
}

/// Idealizes one trace with the configured strategy, then enforces the
/// resolution. `rng` drives only the resolution merge direction.
pub fn idealize<R: Rng + ?Sized>(
    trace: &TraceView<'_>,
    params: &IdealizationParams,
    rng: &mut R,
    ctx: &ExecutionContext<'_>,
) -> Result<Idealized, IdealizeError> {
    params.validate()?;
    ctx.check_cancelled()?;
    let started_at = Instant::now();

    let (idealization, time, mut diagnostics) = match &params.strategy {
        Strategy::ThresholdCrossing {
            amplitudes,
            thresholds,
            interpolation_factor,
        } => {
            let resampled = interpolate(trace, *interpolation_factor)?;
            let outcome =
                threshold_crossing(&resampled.signal, amplitudes, thresholds.as_deref())?;
            let mut diagnostics =
                Diagnostics::for_algorithm("threshold_crossing", resampled.signal.len());
            diagnostics.warnings.extend(outcome.warnings);
            diagnostics.note(format!(
                "amplitudes={}, interpolation_factor={interpolation_factor}",
                outcome.amplitudes.len()
            ));
            (outcome.idealization, resampled.time, diagnostics)
        }
        Strategy::Disc(config) => {
            let outcome = run_disc(trace.signal, config, ctx)?;
            (outcome.idealization, trace.time.to_vec(), outcome.diagnostics)
        }
    };

    let (idealization, events) = match params.resolution {
        Some(resolution) => {
            let outcome = apply_resolution(&idealization, &time, resolution, rng)?;
            if outcome.merges > 0 {
                diagnostics.note(format!("resolution_merges={}", outcome.merges));
            }
            diagnostics.warnings.extend(outcome.warnings);
            (outcome.idealization, outcome.events)
        }
        None => {
            let events = extract_events(&idealization, &time)?;
            (idealization, events)
        }
    };

    diagnostics.runtime_ms = Some(match u64::try_from(started_at.elapsed().as_millis()) {
        Ok(ms) => ms,
        Err(_) => u64::MAX,
    });
    tracing::debug!(
        algorithm = %diagnostics.algorithm,
        n = idealization.len(),
        events = events.len(),
        "idealization finished"
    );

    Ok(Idealized {
        idealization,
        time,
        events,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::{IdealizationParams, Strategy, idealize};
    use idl_core::{Constraints, ExecutionContext, TraceView};
    use idl_disc::DiscConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn threshold_params(resolution: Option<f64>, factor: usize) -> IdealizationParams {
        IdealizationParams {
            strategy: Strategy::ThresholdCrossing {
                amplitudes: vec![0.0, 1.0],
                thresholds: None,
                interpolation_factor: factor,
            },
            resolution,
            seed: 0,
        }
    }

    #[test]
    fn threshold_strategy_produces_events_and_time() {
        let signal = [0.1, 0.0, 0.9, 1.1, 1.0, -0.1];
        let time: Vec<f64> = (0..signal.len()).map(|i| i as f64).collect();
        let trace = TraceView::new(&signal, &time).expect("trace");
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let out = idealize(&trace, &threshold_params(None, 1), &mut rng, &ctx).expect("idealize");
        assert_eq!(out.idealization, vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.0]);
        assert_eq!(out.time, time);
        assert_eq!(out.events.len(), 3);
        assert_eq!(out.diagnostics.algorithm, "threshold_crossing");
    }

    #[test]
    fn interpolation_upsamples_before_thresholding() {
        let signal = [0.0, 1.0, 1.0, 0.0];
        let time = [0.0, 1.0, 2.0, 3.0];
        let trace = TraceView::new(&signal, &time).expect("trace");
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let out = idealize(&trace, &threshold_params(None, 3), &mut rng, &ctx).expect("idealize");
        assert_eq!(out.idealization.len(), 10);
        assert_eq!(out.time.len(), 10);
        let total: f64 = out.events.iter().map(|e| e.duration).sum();
        assert!((total - (3.0 + 1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn resolution_removes_brief_events() {
        let signal = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let time: Vec<f64> = (0..signal.len()).map(|i| i as f64).collect();
        let trace = TraceView::new(&signal, &time).expect("trace");
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let out =
            idealize(&trace, &threshold_params(Some(2.0), 1), &mut rng, &ctx).expect("idealize");
        assert_eq!(out.idealization, vec![0.0; 7]);
        assert_eq!(out.events.len(), 1);
        assert!(out.diagnostics.notes.iter().any(|n| n == "resolution_merges=1"));
    }

    #[test]
    fn disc_strategy_runs_end_to_end() {
        let mut signal = vec![0.0; 40];
        signal.extend(vec![-2.0; 40]);
        let time: Vec<f64> = (0..signal.len()).map(|i| i as f64 * 1.0e-4).collect();
        let trace = TraceView::new(&signal, &time).expect("trace");
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let params = IdealizationParams {
            strategy: Strategy::Disc(DiscConfig::default()),
            resolution: None,
            seed: 0,
        };

        let out = idealize(&trace, &params, &mut rng, &ctx).expect("idealize");
        assert_eq!(out.idealization, signal);
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.diagnostics.algorithm, "disc");
    }

    #[test]
    fn invalid_params_are_rejected() {
        let bad = threshold_params(None, 0);
        assert!(bad.validate().is_err());
        let bad = threshold_params(Some(f64::INFINITY), 1);
        assert!(bad.validate().is_err());
        let bad = IdealizationParams {
            strategy: Strategy::ThresholdCrossing {
                amplitudes: vec![],
                thresholds: None,
                interpolation_factor: 1,
            },
            resolution: None,
            seed: 0,
        };
        assert!(bad.validate().is_err());
        assert!(IdealizationParams::default().validate().is_ok());
    }
}
