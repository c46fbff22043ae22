// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::IdealizeError;

/// Runtime limits applied to the iterative stages (segmentation, decoding).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Constraints {
    /// Wall-clock budget for a single stage, in milliseconds.
    pub time_budget_ms: Option<u64>,
    /// Upper bound on inner-loop iterations for a single stage.
    pub max_iterations: Option<usize>,
}

impl Constraints {
    pub fn validate(&self) -> Result<(), IdealizeError> {
        if matches!(self.time_budget_ms, Some(0)) {
            return Err(IdealizeError::invalid_input(
                "constraints.time_budget_ms must be >= 1 when provided; got 0",
            ));
        }
        if matches!(self.max_iterations, Some(0)) {
            return Err(IdealizeError::invalid_input(
                "constraints.max_iterations must be >= 1 when provided; got 0",
            ));
        }
        Ok(())
    }
}
