// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use idl_core::{DEFAULT_CANCEL_CHECK_EVERY, ExecutionContext, IdealizeError, validate_finite};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::time::Instant;

/// Floor applied to the noise estimate so that `t` stays finite on noiseless input.
pub const MIN_NOISE_STD: f64 = 1.0e-12;

const NOISE_DIFF_SCALE: f64 = 1.4;
const NOISE_QUANTILE: f64 = 0.682;
/// Smallest admissible split offset from either end of a segment.
const MIN_SPLIT_OFFSET: usize = 2;

/// Wavelet-style noise estimate from first differences.
///
/// Returns `sorted(|diff(data)| / 1.4)[round(0.682 * (N - 1))]`, or zero for
/// fewer than two samples.
pub fn estimate_noise_std(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }

    let mut scaled: Vec<f64> = data
        .windows(2)
        .map(|w| (w[1] - w[0]).abs() / NOISE_DIFF_SCALE)
        .collect();
    scaled.sort_by(f64::total_cmp);

    let idx = (NOISE_QUANTILE * (data.len() - 1) as f64).round() as usize;
    scaled[idx.min(scaled.len() - 1)]
}

/// Two-sided Student's-t critical value at `confidence_level` with `n - 1` degrees of freedom.
///
/// Traces shorter than two samples cannot be split, so the threshold is infinite.
pub fn critical_value(confidence_level: f64, n: usize) -> Result<f64, IdealizeError> {
    if !confidence_level.is_finite() || confidence_level <= 0.0 || confidence_level >= 1.0 {
        return Err(IdealizeError::invalid_input(format!(
            "confidence_level must be in (0, 1); got {confidence_level}"
        )));
    }
    if n < 2 {
        return Ok(f64::INFINITY);
    }

    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64).map_err(|err| {
        IdealizeError::numerical_issue(format!(
            "student's t distribution with {} degrees of freedom: {err}",
            n - 1
        ))
    })?;
    let quantile = dist.inverse_cdf(0.5 + confidence_level / 2.0);
    if !quantile.is_finite() {
        return Err(IdealizeError::numerical_issue(format!(
            "non-finite t quantile for confidence_level={confidence_level}, n={n}"
        )));
    }
    Ok(quantile)
}

/// Half-open index range `[start, end)` of a constant-mean segment.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub mean: f64,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Piecewise-constant fit produced by [`ChangepointDetector`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChangepointFit {
    pub fit: Vec<f64>,
    /// Last sample index of every segment but the final one.
    pub changepoints: Vec<usize>,
    pub segments: Vec<Segment>,
    pub candidates_considered: usize,
    pub soft_budget_exceeded: bool,
}

/// Divisive t-test segmentation over an explicit work stack.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangepointDetector {
    pub critical_value: f64,
    pub noise_std: f64,
    pub min_seg_length: usize,
    pub cancel_check_every: usize,
}

#[derive(Clone, Copy, Debug)]
struct Range {
    start: usize,
    end: usize,
}

#[derive(Clone, Copy, Debug)]
struct BestSplit {
    split: usize,
    t: f64,
}

impl ChangepointDetector {
    pub fn new(
        critical_value: f64,
        noise_std: f64,
        min_seg_length: usize,
    ) -> Result<Self, IdealizeError> {
        let detector = Self {
            critical_value,
            noise_std,
            min_seg_length,
            cancel_check_every: DEFAULT_CANCEL_CHECK_EVERY,
        };
        detector.validate()?;
        Ok(detector)
    }

    fn validate(&self) -> Result<(), IdealizeError> {
        if self.critical_value.is_nan() || self.critical_value < 0.0 {
            return Err(IdealizeError::invalid_input(format!(
                "critical_value must be >= 0.0; got {}",
                self.critical_value
            )));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(IdealizeError::invalid_input(format!(
                "noise_std must be finite and >= 0.0; got {}",
                self.noise_std
            )));
        }
        if self.min_seg_length == 0 {
            return Err(IdealizeError::invalid_input(
                "min_seg_length must be >= 1; got 0",
            ));
        }
        Ok(())
    }

    pub fn detect(
        &self,
        data: &[f64],
        ctx: &ExecutionContext<'_>,
    ) -> Result<ChangepointFit, IdealizeError> {
        self.validate()?;
        validate_finite("data", data)?;
        if data.is_empty() {
            return Err(IdealizeError::invalid_input(
                "changepoint detection requires >= 1 sample",
            ));
        }

        let started_at = Instant::now();
        let every = self.cancel_check_every.max(1);
        let sigma = self.noise_std.max(MIN_NOISE_STD);
        let prefix = prefix_sums(data);

        let mut stack = vec![Range {
            start: 0,
            end: data.len(),
        }];
        let mut segments = Vec::new();
        let mut iteration = 0usize;
        let mut soft_budget_exceeded = false;

        while let Some(range) = stack.pop() {
            let best = best_split(&prefix, range, sigma, |_| {
                iteration += 1;
                soft_budget_exceeded |= ctx.poll(iteration, every, started_at)?;
                Ok(())
            })?;

            match best {
                Some(best) if self.accepts(range, best) => {
                    stack.push(Range {
                        start: best.split,
                        end: range.end,
                    });
                    stack.push(Range {
                        start: range.start,
                        end: best.split,
                    });
                }
                _ => segments.push(Segment {
                    start: range.start,
                    end: range.end,
                    mean: range_mean(&prefix, range),
                }),
            }
        }

        segments.sort_unstable_by_key(|segment| segment.start);

        let mut fit = vec![0.0; data.len()];
        for segment in &segments {
            fit[segment.start..segment.end].fill(segment.mean);
        }
        let changepoints = segments
            .iter()
            .take(segments.len().saturating_sub(1))
            .map(|segment| segment.end - 1)
            .collect();

        Ok(ChangepointFit {
            fit,
            changepoints,
            segments,
            candidates_considered: iteration,
            soft_budget_exceeded,
        })
    }

    fn accepts(&self, range: Range, best: BestSplit) -> bool {
        best.t >= self.critical_value
            && best.split - range.start >= self.min_seg_length
            && range.end - best.split >= self.min_seg_length
    }
}

/// Convenience wrapper around [`ChangepointDetector::detect`].
pub fn detect_changepoints(
    data: &[f64],
    critical_value: f64,
    noise_std: f64,
    min_seg_length: usize,
    ctx: &ExecutionContext<'_>,
) -> Result<ChangepointFit, IdealizeError> {
    ChangepointDetector::new(critical_value, noise_std, min_seg_length)?.detect(data, ctx)
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

fn range_mean(prefix: &[f64], range: Range) -> f64 {
    (prefix[range.end] - prefix[range.start]) / (range.end - range.start) as f64
}

/// Maximal two-sample t statistic over splits `n` in `[2, L - 2]`.
fn best_split<F>(
    prefix: &[f64],
    range: Range,
    sigma: f64,
    mut on_candidate: F,
) -> Result<Option<BestSplit>, IdealizeError>
where
    F: FnMut(usize) -> Result<(), IdealizeError>,
{
    let len = range.end - range.start;
    if len < 2 * MIN_SPLIT_OFFSET {
        return Ok(None);
    }

    let total = prefix[range.end] - prefix[range.start];
    let mut best: Option<BestSplit> = None;

    for n in MIN_SPLIT_OFFSET..=len - MIN_SPLIT_OFFSET {
        on_candidate(n)?;

        let split = range.start + n;
        let left_sum = prefix[split] - prefix[range.start];
        let n_left = n as f64;
        let n_right = (len - n) as f64;
        let left_mean = left_sum / n_left;
        let right_mean = (total - left_sum) / n_right;
        let t = (left_mean - right_mean).abs() / (sigma * (1.0 / n_left + 1.0 / n_right).sqrt());

        if best.is_none_or(|current| t > current.t) {
            best = Some(BestSplit { split, t });
        }
    }

    Ok(best)
}
