// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Core shared types for the idealization engine: the error type, trace
//! views, event records, execution control and run diagnostics.

pub mod constraints;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod execution_context;
pub mod trace;

pub use constraints::Constraints;
pub use control::{BudgetMode, BudgetStatus, CancelToken};
pub use diagnostics::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics};
pub use error::IdealizeError;
pub use event::Event;
pub use execution_context::ExecutionContext;
pub use trace::{TraceView, sampling_interval, validate_finite, validate_time_base};

/// Default cadence for cooperative cancellation polling in inner loops.
pub const DEFAULT_CANCEL_CHECK_EVERY: usize = 1000;

/// Returns the index of the first maximum, ignoring NaN entries.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
