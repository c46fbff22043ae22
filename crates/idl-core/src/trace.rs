// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::IdealizeError;

/// Zero-copy view over a sampled current trace and its time base.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceView<'a> {
    pub signal: &'a [f64],
    pub time: &'a [f64],
}

impl<'a> TraceView<'a> {
    /// Constructs a validated `TraceView`.
    ///
    /// Requires at least one sample, equal lengths, finite values and a
    /// strictly increasing time base.
    pub fn new(signal: &'a [f64], time: &'a [f64]) -> Result<Self, IdealizeError> {
        if signal.is_empty() {
            return Err(IdealizeError::invalid_input("trace must contain >= 1 sample"));
        }
        if signal.len() != time.len() {
            return Err(IdealizeError::invalid_input(format!(
                "signal/time length mismatch: signal={}, time={}",
                signal.len(),
                time.len()
            )));
        }
        validate_finite("signal", signal)?;
        validate_time_base(time)?;
        Ok(Self { signal, time })
    }

    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    /// Sampling interval `time[1] - time[0]`; zero for single-sample traces.
    pub fn dt(&self) -> f64 {
        sampling_interval(self.time)
    }

    /// Total covered duration including the last sample's interval.
    pub fn span(&self) -> f64 {
        self.time[self.time.len() - 1] - self.time[0] + self.dt()
    }
}

/// Sampling interval `time[1] - time[0]`, or zero when fewer than two samples exist.
pub fn sampling_interval(time: &[f64]) -> f64 {
    if time.len() < 2 {
        return 0.0;
    }
    time[1] - time[0]
}

/// Rejects NaN or infinite entries.
pub fn validate_finite(name: &str, values: &[f64]) -> Result<(), IdealizeError> {
    if let Some((idx, value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(IdealizeError::invalid_input(format!(
            "{name} must be finite: index {idx} has {value}"
        )));
    }
    Ok(())
}

/// Rejects non-finite or non-increasing time bases.
pub fn validate_time_base(time: &[f64]) -> Result<(), IdealizeError> {
    validate_finite("time", time)?;
    if let Some(idx) = time.windows(2).position(|w| w[1] <= w[0]) {
        return Err(IdealizeError::invalid_input(format!(
            "time must be strictly increasing: time[{}]={} >= time[{}]={}",
            idx,
            time[idx],
            idx + 1,
            time[idx + 1]
        )));
    }
    Ok(())
}
