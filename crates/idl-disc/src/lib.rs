// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! DISC: divisive changepoint segmentation, amplitude clustering and HMM
//! refinement of single-channel current traces.

pub mod changepoint;
pub mod cluster;
pub mod criterion;
pub mod divisive;
pub mod hmm;
pub mod pipeline;

pub use changepoint::{
    ChangepointDetector, ChangepointFit, MIN_NOISE_STD, Segment, critical_value,
    detect_changepoints, estimate_noise_std,
};
pub use cluster::{ClusterOutcome, cluster, ward_distance};
pub use criterion::{BicMethod, FitSummary, InformationCriterion, information_criterion};
pub use divisive::{DivisiveOutcome, divisive_split};
pub use hmm::{
    EMISSION_FLOOR, EmissionMatrix, MIN_STATE_STD, StateComponent, TRANSITION_EPSILON,
    TransitionMatrix, ViterbiDecoder, ViterbiPath, compute_emission_matrix, decode,
    empirical_transition_matrix, fit_components,
};
pub use pipeline::{DiscConfig, DiscOutcome, run_disc};
