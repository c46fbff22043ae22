// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// One constant-amplitude run of an idealization.
///
/// Sample indices are inclusive on both ends, so
/// `duration == t_end - t_start + dt`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub amplitude: f64,
    pub duration: f64,
    pub t_start: f64,
    pub t_end: f64,
    pub start_index: usize,
    pub end_index: usize,
}

impl Event {
    /// `(amplitude, duration, t_start, t_end)` as consumed by the export layer.
    pub fn row(&self) -> [f64; 4] {
        [self.amplitude, self.duration, self.t_start, self.t_end]
    }

    /// Number of samples covered.
    pub fn n_samples(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}
