// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::criterion::{BicMethod, FitSummary, InformationCriterion, score_summary};
use idl_core::{IdealizeError, validate_finite};

/// Best fit from the agglomerative merge family.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterOutcome {
    pub fit: Vec<f64>,
    /// Per-sample index into `state_values`.
    pub labels: Vec<usize>,
    /// Distinct amplitudes of `fit`, ascending.
    pub state_values: Vec<f64>,
    pub n_states: usize,
    /// `(n_states, score)` for every member of the family, from `K` down to 1.
    pub scores: Vec<(usize, f64)>,
}

#[derive(Clone, Debug)]
struct Cluster {
    value: f64,
    count: usize,
    sum: f64,
    /// Initial levels that make up this cluster.
    members: Vec<usize>,
}

/// Ward merge cost between two clusters.
pub fn ward_distance(n_i: usize, level_i: f64, n_j: usize, level_j: f64) -> f64 {
    let (n_i, n_j) = (n_i as f64, n_j as f64);
    (2.0 * n_i * n_j / (n_i + n_j)).sqrt() * (level_i - level_j).abs()
}

/// Merges the levels of `fit` by Ward distance and keeps the family member
/// with the lowest score. Equal scores resolve to fewer states.
pub fn cluster(
    data: &[f64],
    fit: &[f64],
    criterion: InformationCriterion,
    method: BicMethod,
) -> Result<ClusterOutcome, IdealizeError> {
    if data.len() != fit.len() {
        return Err(IdealizeError::invalid_input(format!(
            "data/fit length mismatch: data={}, fit={}",
            data.len(),
            fit.len()
        )));
    }
    if data.is_empty() {
        return Err(IdealizeError::invalid_input("clustering requires >= 1 sample"));
    }
    validate_finite("data", data)?;
    validate_finite("fit", fit)?;

    let mut levels = fit.to_vec();
    levels.sort_by(f64::total_cmp);
    levels.dedup();

    let level_of: Vec<usize> = fit
        .iter()
        .map(|value| levels.partition_point(|level| level < value))
        .collect();

    let mut clusters: Vec<Cluster> = levels
        .iter()
        .enumerate()
        .map(|(idx, &value)| Cluster {
            value,
            count: 0,
            sum: 0.0,
            members: vec![idx],
        })
        .collect();
    for (&level, &x) in level_of.iter().zip(data) {
        clusters[level].count += 1;
        clusters[level].sum += x;
    }

    let mut best_values = cluster_values(&clusters, levels.len());
    let mut best_score = score_values(data, &level_of, &best_values, criterion, method)?;
    let mut scores = vec![(clusters.len(), best_score)];

    while clusters.len() > 1 {
        let (i, j) = closest_pair(&clusters);
        let absorbed = clusters.swap_remove(j);
        let target = &mut clusters[i];
        target.count += absorbed.count;
        target.sum += absorbed.sum;
        target.value = target.sum / target.count as f64;
        target.members.extend(absorbed.members);

        let values = cluster_values(&clusters, levels.len());
        let score = score_values(data, &level_of, &values, criterion, method)?;
        scores.push((clusters.len(), score));
        if score <= best_score {
            best_score = score;
            best_values = values;
        }
    }

    let fit: Vec<f64> = level_of.iter().map(|&level| best_values[level]).collect();
    let mut state_values = best_values;
    state_values.sort_by(f64::total_cmp);
    state_values.dedup();
    let labels = fit
        .iter()
        .map(|value| state_values.partition_point(|state| state < value))
        .collect();

    tracing::debug!(
        n = data.len(),
        initial_levels = levels.len(),
        n_states = state_values.len(),
        score = best_score,
        "agglomerative clustering finished"
    );

    Ok(ClusterOutcome {
        fit,
        labels,
        n_states: state_values.len(),
        state_values,
        scores,
    })
}

/// First pair with the smallest nonzero distance, or the first zero-distance
/// pair when every distance is zero. Indices satisfy `i < j`.
fn closest_pair(clusters: &[Cluster]) -> (usize, usize) {
    let mut best_nonzero: Option<(usize, usize, f64)> = None;
    let mut first_zero: Option<(usize, usize)> = None;

    for i in 0..clusters.len() {
        for j in i + 1..clusters.len() {
            let d = ward_distance(
                clusters[i].count,
                clusters[i].value,
                clusters[j].count,
                clusters[j].value,
            );
            if d > 0.0 {
                if best_nonzero.is_none_or(|(_, _, current)| d < current) {
                    best_nonzero = Some((i, j, d));
                }
            } else if first_zero.is_none() {
                first_zero = Some((i, j));
            }
        }
    }

    match (best_nonzero, first_zero) {
        (Some((i, j, _)), _) => (i, j),
        (None, Some(pair)) => pair,
        (None, None) => (0, 1),
    }
}

/// Current value of every initial level.
fn cluster_values(clusters: &[Cluster], n_levels: usize) -> Vec<f64> {
    let mut values = vec![0.0; n_levels];
    for cluster in clusters {
        for &member in &cluster.members {
            values[member] = cluster.value;
        }
    }
    values
}

fn score_values(
    data: &[f64],
    level_of: &[usize],
    values: &[f64],
    criterion: InformationCriterion,
    method: BicMethod,
) -> Result<f64, IdealizeError> {
    let fit: Vec<f64> = level_of.iter().map(|&level| values[level]).collect();
    let summary = FitSummary::from_fit(data, &fit)?;
    Ok(score_summary(&summary, criterion, method))
}
