// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::changepoint::{ChangepointDetector, critical_value, estimate_noise_std};
use crate::cluster::cluster;
use crate::criterion::{BicMethod, InformationCriterion};
use crate::divisive::divisive_split;
use crate::hmm::{
    StateComponent, ViterbiDecoder, compute_emission_matrix, empirical_transition_matrix,
    fit_components,
};
use idl_core::{
    DEFAULT_CANCEL_CHECK_EVERY, Diagnostics, ExecutionContext, IdealizeError, validate_finite,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.999;
const DEFAULT_MIN_SEG_LENGTH: usize = 3;
const DEFAULT_MIN_CLUSTER_SIZE: usize = 3;

/// Configuration for [`run_disc`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct DiscConfig {
    /// Two-sided confidence of the changepoint t-test, in `(0, 1)`.
    pub confidence_level: f64,
    pub min_seg_length: usize,
    pub min_cluster_size: usize,
    /// Criterion for accepting divisive cluster splits.
    pub ic_div_seg: InformationCriterion,
    /// Criterion for choosing among agglomerative merges.
    pub ic_hac: InformationCriterion,
    pub bic_method: BicMethod,
    /// Seeds k-means initialization.
    pub seed: u64,
    pub cancel_check_every: usize,
}

impl Default for DiscConfig {
    fn default() -> Self {
        Self {
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            min_seg_length: DEFAULT_MIN_SEG_LENGTH,
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            ic_div_seg: InformationCriterion::Bic,
            ic_hac: InformationCriterion::Bic,
            bic_method: BicMethod::Full,
            seed: 0,
            cancel_check_every: DEFAULT_CANCEL_CHECK_EVERY,
        }
    }
}

impl DiscConfig {
    pub fn validate(&self) -> Result<(), IdealizeError> {
        if !self.confidence_level.is_finite()
            || self.confidence_level <= 0.0
            || self.confidence_level >= 1.0
        {
            return Err(IdealizeError::invalid_input(format!(
                "DiscConfig.confidence_level must be in (0, 1); got {}",
                self.confidence_level
            )));
        }
        if self.min_seg_length == 0 {
            return Err(IdealizeError::invalid_input(
                "DiscConfig.min_seg_length must be >= 1; got 0",
            ));
        }
        if self.min_cluster_size == 0 {
            return Err(IdealizeError::invalid_input(
                "DiscConfig.min_cluster_size must be >= 1; got 0",
            ));
        }
        Ok(())
    }

    fn normalized_cancel_check_every(&self) -> usize {
        self.cancel_check_every.max(1)
    }
}

/// Output of a DISC run.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscOutcome {
    pub idealization: Vec<f64>,
    /// Amplitudes present in `idealization`, ascending.
    pub state_values: Vec<f64>,
    /// Changepoints of the initial segmentation (last index of each left segment).
    pub changepoints: Vec<usize>,
    pub n_states: usize,
    pub components: Vec<StateComponent>,
    pub diagnostics: Diagnostics,
}

/// Divisive segmentation, clustering and HMM refinement of one trace.
///
/// Deterministic for a fixed `config.seed`.
pub fn run_disc(
    data: &[f64],
    config: &DiscConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<DiscOutcome, IdealizeError> {
    config.validate()?;
    if data.is_empty() {
        return Err(IdealizeError::invalid_input("DISC requires >= 1 sample"));
    }
    validate_finite("data", data)?;

    let started_at = Instant::now();
    let cancel_check_every = config.normalized_cancel_check_every();
    let mut diagnostics = Diagnostics::for_algorithm("disc", data.len());
    diagnostics.seed = Some(config.seed);

    let noise_std = estimate_noise_std(data);
    let detector = ChangepointDetector {
        critical_value: critical_value(config.confidence_level, data.len())?,
        noise_std,
        min_seg_length: config.min_seg_length,
        cancel_check_every,
    };
    let segmentation = detector.detect(data, ctx)?;
    diagnostics.note(format!(
        "noise_std={noise_std}, critical_value={}, segments={}",
        detector.critical_value,
        segmentation.segments.len()
    ));

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let divisive = divisive_split(
        data,
        &segmentation.fit,
        config.min_cluster_size,
        config.ic_div_seg,
        config.bic_method,
        &mut rng,
        ctx,
    )?;
    diagnostics.note(format!(
        "divisive_clusters={}, splits_accepted={}, splits_rejected={}",
        divisive.n_clusters, divisive.splits_accepted, divisive.splits_rejected
    ));

    let clustered = cluster(data, &divisive.fit, config.ic_hac, config.bic_method)?;
    diagnostics.note(format!("hac_states={}", clustered.n_states));

    let k = clustered.n_states;
    let components = fit_components(data, &clustered.labels, k)?;
    let transition = empirical_transition_matrix(&clustered.labels, k)?;
    let emission = compute_emission_matrix(data, &components)?;
    let initial: Vec<f64> = components.iter().map(|c| c.weight).collect();
    let path = ViterbiDecoder { cancel_check_every }.decode_states(
        &initial,
        &transition,
        &emission,
        ctx,
    )?;

    let idealization: Vec<f64> = path.states.iter().map(|&s| components[s].mean).collect();
    let mut state_values = idealization.clone();
    state_values.sort_by(f64::total_cmp);
    state_values.dedup();

    if segmentation.soft_budget_exceeded || divisive.soft_budget_exceeded || path.soft_budget_exceeded
    {
        diagnostics.soft_budget_exceeded = true;
        diagnostics.warn(
            "budget exceeded under SoftDegrade mode; run continued without algorithm fallback",
        );
    }
    if state_values.len() < k {
        diagnostics.note(format!(
            "viterbi left {} of {k} states unused",
            k - state_values.len()
        ));
    }

    diagnostics.runtime_ms = Some(match u64::try_from(started_at.elapsed().as_millis()) {
        Ok(ms) => ms,
        Err(_) => u64::MAX,
    });
    #[cfg(feature = "serde")]
    {
        diagnostics.params_json = serde_json::to_value(config).ok();
    }

    tracing::debug!(
        n = data.len(),
        changepoints = segmentation.changepoints.len(),
        n_states = state_values.len(),
        seed = config.seed,
        "DISC finished"
    );

    Ok(DiscOutcome {
        n_states: state_values.len(),
        idealization,
        state_values,
        changepoints: segmentation.changepoints,
        components,
        diagnostics,
    })
}
