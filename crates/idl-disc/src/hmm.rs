// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Gaussian-emission hidden Markov model: parameter fitting from a labelled
//! trace and Viterbi decoding of the most likely state path.

use idl_core::{DEFAULT_CANCEL_CHECK_EVERY, ExecutionContext, IdealizeError, argmax, validate_finite};
use std::time::Instant;

/// Added to every entry of a transition row that never leaves its state.
pub const TRANSITION_EPSILON: f64 = 1.0e-6;
/// Lower bound on a shifted emission density before column normalization.
pub const EMISSION_FLOOR: f64 = 1.0e-12;
/// Lower bound on a fitted state standard deviation.
pub const MIN_STATE_STD: f64 = 1.0e-9;

/// Fitted parameters of one hidden state.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateComponent {
    /// Fraction of samples assigned to the state.
    pub weight: f64,
    pub mean: f64,
    pub std: f64,
}

/// Row-stochastic `K x K` matrix; `get(from, to)`.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionMatrix {
    k: usize,
    probs: Vec<f64>,
    /// Column-major copy so predecessor scans read contiguous memory.
    transposed: Vec<f64>,
}

impl TransitionMatrix {
    /// Builds a matrix from row-major probabilities. Rows must sum to one.
    pub fn from_rows(k: usize, probs: Vec<f64>) -> Result<Self, IdealizeError> {
        if k == 0 {
            return Err(IdealizeError::invalid_input(
                "transition matrix requires >= 1 state",
            ));
        }
        if probs.len() != k * k {
            return Err(IdealizeError::invalid_input(format!(
                "transition matrix shape mismatch: expected {} entries for k={k}, got {}",
                k * k,
                probs.len()
            )));
        }
        validate_finite("transition", &probs)?;
        for (row_idx, row) in probs.chunks_exact(k).enumerate() {
            if row.iter().any(|&p| p < 0.0) {
                return Err(IdealizeError::invalid_input(format!(
                    "transition row {row_idx} has a negative entry"
                )));
            }
            let total: f64 = row.iter().sum();
            if (total - 1.0).abs() > 1.0e-9 {
                return Err(IdealizeError::invalid_input(format!(
                    "transition row {row_idx} sums to {total}; expected 1"
                )));
            }
        }

        let mut transposed = vec![0.0; k * k];
        for from in 0..k {
            for to in 0..k {
                transposed[to * k + from] = probs[from * k + to];
            }
        }
        Ok(Self {
            k,
            probs,
            transposed,
        })
    }

    pub fn n_states(&self) -> usize {
        self.k
    }

    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.probs[from * self.k + to]
    }

    pub fn row(&self, from: usize) -> &[f64] {
        &self.probs[from * self.k..(from + 1) * self.k]
    }

    /// Probabilities of entering `to` from every state.
    fn entering(&self, to: usize) -> &[f64] {
        &self.transposed[to * self.k..(to + 1) * self.k]
    }
}

/// `K x N` per-sample state probabilities stored state-major; every column sums to one.
#[derive(Clone, Debug, PartialEq)]
pub struct EmissionMatrix {
    k: usize,
    n: usize,
    values: Vec<f64>,
}

impl EmissionMatrix {
    /// Builds a matrix from state-major values (`values[state * n + sample]`).
    pub fn from_state_major(k: usize, n: usize, values: Vec<f64>) -> Result<Self, IdealizeError> {
        if k == 0 || n == 0 {
            return Err(IdealizeError::invalid_input(format!(
                "emission matrix requires k >= 1 and n >= 1; got k={k}, n={n}"
            )));
        }
        if values.len() != k * n {
            return Err(IdealizeError::invalid_input(format!(
                "emission matrix shape mismatch: expected {} entries for k={k}, n={n}, got {}",
                k * n,
                values.len()
            )));
        }
        validate_finite("emission", &values)?;
        if values.iter().any(|&v| v < 0.0) {
            return Err(IdealizeError::invalid_input(
                "emission matrix has a negative entry",
            ));
        }
        Ok(Self { k, n, values })
    }

    pub fn n_states(&self) -> usize {
        self.k
    }

    pub fn n_samples(&self) -> usize {
        self.n
    }

    pub fn get(&self, state: usize, sample: usize) -> f64 {
        self.values[state * self.n + sample]
    }

    pub fn state_row(&self, state: usize) -> &[f64] {
        &self.values[state * self.n..(state + 1) * self.n]
    }
}

fn validate_labels(labels: &[usize], k: usize) -> Result<(), IdealizeError> {
    if k == 0 {
        return Err(IdealizeError::invalid_input("k must be >= 1; got 0"));
    }
    if let Some((idx, &label)) = labels.iter().enumerate().find(|(_, label)| **label >= k) {
        return Err(IdealizeError::invalid_input(format!(
            "state label out of range at index {idx}: label={label}, k={k}"
        )));
    }
    Ok(())
}

/// Counts one-step transitions in `states` and normalizes every row.
pub fn empirical_transition_matrix(
    states: &[usize],
    k: usize,
) -> Result<TransitionMatrix, IdealizeError> {
    validate_labels(states, k)?;

    let mut counts = vec![0.0; k * k];
    for pair in states.windows(2) {
        counts[pair[0] * k + pair[1]] += 1.0;
    }

    for row in counts.chunks_exact_mut(k) {
        let mut total: f64 = row.iter().sum();
        if total == 0.0 {
            row.iter_mut().for_each(|p| *p += TRANSITION_EPSILON);
            total = TRANSITION_EPSILON * k as f64;
        }
        row.iter_mut().for_each(|p| *p /= total);
    }

    TransitionMatrix::from_rows(k, counts)
}

/// Per-state occupancy, mean and standard deviation from a hard labelling.
///
/// A state whose spread collapses (one sample, or constant values) borrows the
/// pooled within-state deviation; unused states sit at the global mean with
/// zero weight.
pub fn fit_components(
    data: &[f64],
    labels: &[usize],
    k: usize,
) -> Result<Vec<StateComponent>, IdealizeError> {
    if data.len() != labels.len() {
        return Err(IdealizeError::invalid_input(format!(
            "data/labels length mismatch: data={}, labels={}",
            data.len(),
            labels.len()
        )));
    }
    if data.is_empty() {
        return Err(IdealizeError::invalid_input(
            "component fitting requires >= 1 sample",
        ));
    }
    validate_labels(labels, k)?;
    validate_finite("data", data)?;

    let n = data.len() as f64;
    let mut counts = vec![0usize; k];
    let mut sums = vec![0.0; k];
    for (&label, &x) in labels.iter().zip(data) {
        counts[label] += 1;
        sums[label] += x;
    }
    let global_mean = sums.iter().sum::<f64>() / n;
    let means: Vec<f64> = counts
        .iter()
        .zip(&sums)
        .map(|(&count, &sum)| {
            if count == 0 {
                global_mean
            } else {
                sum / count as f64
            }
        })
        .collect();

    let mut sq = vec![0.0; k];
    for (&label, &x) in labels.iter().zip(data) {
        let dev = x - means[label];
        sq[label] += dev * dev;
    }
    let pooled_std = (sq.iter().sum::<f64>() / n).sqrt().max(MIN_STATE_STD);

    Ok((0..k)
        .map(|state| {
            let std = if counts[state] > 1 {
                (sq[state] / counts[state] as f64).sqrt()
            } else {
                0.0
            };
            StateComponent {
                weight: counts[state] as f64 / n,
                mean: means[state],
                std: if std < MIN_STATE_STD { pooled_std } else { std },
            }
        })
        .collect())
}

/// Evaluates every component's Gaussian density at every sample, in log
/// space, and column-normalizes.
pub fn compute_emission_matrix(
    data: &[f64],
    components: &[StateComponent],
) -> Result<EmissionMatrix, IdealizeError> {
    if components.is_empty() {
        return Err(IdealizeError::invalid_input(
            "emission matrix requires >= 1 component",
        ));
    }
    if data.is_empty() {
        return Err(IdealizeError::invalid_input(
            "emission matrix requires >= 1 sample",
        ));
    }
    validate_finite("data", data)?;
    for (idx, component) in components.iter().enumerate() {
        if !component.mean.is_finite() || !component.std.is_finite() || component.std <= 0.0 {
            return Err(IdealizeError::invalid_input(format!(
                "component {idx} must have finite mean and std > 0; got mean={}, std={}",
                component.mean, component.std
            )));
        }
    }

    let k = components.len();
    let n = data.len();
    let log_norm: Vec<f64> = components.iter().map(|c| -c.std.ln()).collect();
    let mut values = vec![0.0; k * n];
    let mut column = vec![0.0; k];

    for (sample, &x) in data.iter().enumerate() {
        for ((slot, component), &norm) in column.iter_mut().zip(components).zip(&log_norm) {
            let z = (x - component.mean) / component.std;
            *slot = norm - 0.5 * z * z;
        }
        let shift = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut total = 0.0;
        for slot in column.iter_mut() {
            *slot = (*slot - shift).exp().max(EMISSION_FLOOR);
            total += *slot;
        }
        for (state, &density) in column.iter().enumerate() {
            values[state * n + sample] = density / total;
        }
    }

    EmissionMatrix::from_state_major(k, n, values)
}

/// Most likely state path, as state indices.
#[derive(Clone, Debug, PartialEq)]
pub struct ViterbiPath {
    pub states: Vec<usize>,
    pub soft_budget_exceeded: bool,
}

/// Viterbi decoder with per-column normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViterbiDecoder {
    pub cancel_check_every: usize,
}

impl Default for ViterbiDecoder {
    fn default() -> Self {
        Self {
            cancel_check_every: DEFAULT_CANCEL_CHECK_EVERY,
        }
    }
}

impl ViterbiDecoder {
    pub fn decode_states(
        &self,
        initial: &[f64],
        transition: &TransitionMatrix,
        emission: &EmissionMatrix,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ViterbiPath, IdealizeError> {
        let k = emission.n_states();
        let n = emission.n_samples();
        if transition.n_states() != k || initial.len() != k {
            return Err(IdealizeError::invalid_input(format!(
                "state count mismatch: initial={}, transition={}, emission={k}",
                initial.len(),
                transition.n_states()
            )));
        }
        validate_finite("initial", initial)?;
        if initial.iter().any(|&p| p < 0.0) || initial.iter().sum::<f64>() <= 0.0 {
            return Err(IdealizeError::invalid_input(
                "initial distribution must be non-negative with a positive sum",
            ));
        }

        let started_at = Instant::now();
        let every = self.cancel_check_every.max(1);
        let mut soft_budget_exceeded = false;

        let mut prev: Vec<f64> = (0..k).map(|s| initial[s] * emission.get(s, 0)).collect();
        normalize_column(&mut prev, 0)?;
        let mut next = vec![0.0; k];
        let mut backpointers = vec![0usize; n * k];

        for sample in 1..n {
            soft_budget_exceeded |= ctx.poll(sample, every, started_at)?;

            let pointers = &mut backpointers[sample * k..(sample + 1) * k];
            for (state, (slot, pointer)) in next.iter_mut().zip(pointers.iter_mut()).enumerate() {
                let mut best_from = 0;
                let mut best = f64::NEG_INFINITY;
                for (from, (&p, &t)) in prev.iter().zip(transition.entering(state)).enumerate() {
                    let candidate = p * t;
                    if candidate > best {
                        best = candidate;
                        best_from = from;
                    }
                }
                *pointer = best_from;
                *slot = best * emission.get(state, sample);
            }
            normalize_column(&mut next, sample)?;
            std::mem::swap(&mut prev, &mut next);
        }

        let Some(last) = argmax(&prev) else {
            return Err(IdealizeError::numerical_issue(
                "viterbi final column has no finite maximum",
            ));
        };
        let mut states = vec![0usize; n];
        states[n - 1] = last;
        for sample in (1..n).rev() {
            states[sample - 1] = backpointers[sample * k + states[sample]];
        }

        Ok(ViterbiPath {
            states,
            soft_budget_exceeded,
        })
    }

    /// Decodes and maps every state index to its amplitude.
    pub fn decode(
        &self,
        initial: &[f64],
        transition: &TransitionMatrix,
        emission: &EmissionMatrix,
        state_values: &[f64],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<f64>, IdealizeError> {
        if state_values.len() != emission.n_states() {
            return Err(IdealizeError::invalid_input(format!(
                "state_values length mismatch: expected {}, got {}",
                emission.n_states(),
                state_values.len()
            )));
        }
        let path = self.decode_states(initial, transition, emission, ctx)?;
        Ok(path.states.iter().map(|&s| state_values[s]).collect())
    }
}

/// [`ViterbiDecoder::decode`] with the default polling cadence.
pub fn decode(
    initial: &[f64],
    transition: &TransitionMatrix,
    emission: &EmissionMatrix,
    state_values: &[f64],
    ctx: &ExecutionContext<'_>,
) -> Result<Vec<f64>, IdealizeError> {
    ViterbiDecoder::default().decode(initial, transition, emission, state_values, ctx)
}

fn normalize_column(column: &mut [f64], sample: usize) -> Result<(), IdealizeError> {
    let total: f64 = column.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(IdealizeError::numerical_issue(format!(
            "viterbi column {sample} has non-positive mass {total}"
        )));
    }
    column.iter_mut().for_each(|p| *p /= total);
    Ok(())
}
