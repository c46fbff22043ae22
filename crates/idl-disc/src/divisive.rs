// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::criterion::{BicMethod, FitSummary, InformationCriterion, score_summary};
use idl_core::{BudgetStatus, ExecutionContext, IdealizeError, validate_finite};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use std::time::Instant;

const MAX_LLOYD_ITERATIONS: usize = 100;

/// Result of the divisive clustering stage.
#[derive(Clone, Debug, PartialEq)]
pub struct DivisiveOutcome {
    pub fit: Vec<f64>,
    pub n_clusters: usize,
    pub splits_accepted: usize,
    pub splits_rejected: usize,
    pub soft_budget_exceeded: bool,
}

/// Maximal run of equal values in a piecewise-constant fit.
#[derive(Clone, Copy, Debug)]
struct Run {
    start: usize,
    end: usize,
    sum: f64,
}

impl Run {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn mean(&self) -> f64 {
        self.sum / self.len() as f64
    }
}

fn runs_of(data: &[f64], fit: &[f64]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut start = 0;
    for idx in 1..=fit.len() {
        if idx == fit.len() || fit[idx] != fit[start] {
            runs.push(Run {
                start,
                end: idx,
                sum: data[start..idx].iter().sum(),
            });
            start = idx;
        }
    }
    runs
}

/// Splits the runs of a changepoint fit into amplitude clusters, top-down.
///
/// Starts from a single cluster holding every run. Each cluster is bisected
/// with length-weighted 2-means over run means; the split is kept only when it
/// lowers `criterion` for the whole trace and both children cover at least
/// `min_cluster_size` samples. Every cluster level is the mean of its samples.
pub fn divisive_split<R: Rng + ?Sized>(
    data: &[f64],
    fit: &[f64],
    min_cluster_size: usize,
    criterion: InformationCriterion,
    method: BicMethod,
    rng: &mut R,
    ctx: &ExecutionContext<'_>,
) -> Result<DivisiveOutcome, IdealizeError> {
    if data.len() != fit.len() {
        return Err(IdealizeError::invalid_input(format!(
            "data/fit length mismatch: data={}, fit={}",
            data.len(),
            fit.len()
        )));
    }
    if data.is_empty() {
        return Err(IdealizeError::invalid_input(
            "divisive clustering requires >= 1 sample",
        ));
    }
    if min_cluster_size == 0 {
        return Err(IdealizeError::invalid_input(
            "min_cluster_size must be >= 1; got 0",
        ));
    }
    validate_finite("data", data)?;
    validate_finite("fit", fit)?;

    let started_at = Instant::now();
    let runs = runs_of(data, fit);
    let mut labels = vec![0usize; runs.len()];
    let mut levels = vec![data.iter().sum::<f64>() / data.len() as f64];

    let mut current_score = score_labels(data, &runs, &labels, &levels, criterion, method)?;
    let mut stack = vec![0usize];
    let mut splits_accepted = 0usize;
    let mut splits_rejected = 0usize;
    let mut soft_budget_exceeded = false;

    while let Some(cluster) = stack.pop() {
        ctx.check_cancelled()?;
        soft_budget_exceeded |=
            ctx.check_time_budget(started_at)? == BudgetStatus::ExceededSoftDegrade;

        let members: Vec<usize> = (0..runs.len()).filter(|&r| labels[r] == cluster).collect();
        let Some(upper) = two_means(&runs, &members, rng)? else {
            continue;
        };

        let (lower_stats, upper_stats) = child_stats(&runs, &members, &upper);
        if lower_stats.1 < min_cluster_size || upper_stats.1 < min_cluster_size {
            splits_rejected += 1;
            continue;
        }

        let new_cluster = levels.len();
        let previous_level = levels[cluster];
        levels[cluster] = lower_stats.0 / lower_stats.1 as f64;
        levels.push(upper_stats.0 / upper_stats.1 as f64);
        for (&member, &is_upper) in members.iter().zip(&upper) {
            if is_upper {
                labels[member] = new_cluster;
            }
        }

        let candidate_score = score_labels(data, &runs, &labels, &levels, criterion, method)?;
        if candidate_score < current_score {
            current_score = candidate_score;
            splits_accepted += 1;
            stack.push(new_cluster);
            stack.push(cluster);
        } else {
            for &member in &members {
                labels[member] = cluster;
            }
            levels.pop();
            levels[cluster] = previous_level;
            splits_rejected += 1;
        }
    }

    let fit = expand(data.len(), &runs, &labels, &levels);
    tracing::debug!(
        n = data.len(),
        runs = runs.len(),
        clusters = levels.len(),
        splits_accepted,
        splits_rejected,
        "divisive clustering finished"
    );

    Ok(DivisiveOutcome {
        fit,
        n_clusters: levels.len(),
        splits_accepted,
        splits_rejected,
        soft_budget_exceeded,
    })
}

fn expand(n: usize, runs: &[Run], labels: &[usize], levels: &[f64]) -> Vec<f64> {
    let mut fit = vec![0.0; n];
    for (run, &label) in runs.iter().zip(labels) {
        fit[run.start..run.end].fill(levels[label]);
    }
    fit
}

fn score_labels(
    data: &[f64],
    runs: &[Run],
    labels: &[usize],
    levels: &[f64],
    criterion: InformationCriterion,
    method: BicMethod,
) -> Result<f64, IdealizeError> {
    let fit = expand(data.len(), runs, labels, levels);
    let summary = FitSummary::from_fit(data, &fit)?;
    Ok(score_summary(&summary, criterion, method))
}

/// `(sum, count)` of the lower and upper child.
fn child_stats(runs: &[Run], members: &[usize], upper: &[bool]) -> ((f64, usize), (f64, usize)) {
    let mut lower_stats = (0.0, 0usize);
    let mut upper_stats = (0.0, 0usize);
    for (&member, &is_upper) in members.iter().zip(upper) {
        let run = &runs[member];
        let slot = if is_upper {
            &mut upper_stats
        } else {
            &mut lower_stats
        };
        slot.0 += run.sum;
        slot.1 += run.len();
    }
    (lower_stats, upper_stats)
}

/// Length-weighted 2-means over run means with k-means++ seeding.
///
/// Returns, per member, whether it belongs to the cluster with the larger
/// center, or `None` when the members cannot be separated.
fn two_means<R: Rng + ?Sized>(
    runs: &[Run],
    members: &[usize],
    rng: &mut R,
) -> Result<Option<Vec<bool>>, IdealizeError> {
    if members.len() < 2 {
        return Ok(None);
    }

    let points: Vec<f64> = members.iter().map(|&m| runs[m].mean()).collect();
    let weights: Vec<f64> = members.iter().map(|&m| runs[m].len() as f64).collect();

    let first = WeightedIndex::new(&weights)
        .map_err(|err| IdealizeError::numerical_issue(format!("k-means++ seeding: {err}")))?
        .sample(rng);
    let seed_weights: Vec<f64> = points
        .iter()
        .zip(&weights)
        .map(|(&x, &w)| w * (x - points[first]) * (x - points[first]))
        .collect();
    // All members share one mean.
    let Ok(second_dist) = WeightedIndex::new(&seed_weights) else {
        return Ok(None);
    };
    let second = second_dist.sample(rng);

    let mut centers = [points[first], points[second]];
    let mut assignment: Vec<bool> = vec![false; points.len()];

    for iteration in 0..MAX_LLOYD_ITERATIONS {
        let mut changed = iteration == 0;
        for (slot, &x) in assignment.iter_mut().zip(&points) {
            let to_second = (x - centers[1]).abs() < (x - centers[0]).abs();
            if *slot != to_second {
                *slot = to_second;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = [0.0; 2];
        let mut totals = [0.0; 2];
        for ((&x, &w), &to_second) in points.iter().zip(&weights).zip(&assignment) {
            let slot = usize::from(to_second);
            sums[slot] += w * x;
            totals[slot] += w;
        }
        if totals[0] == 0.0 || totals[1] == 0.0 {
            return Ok(None);
        }
        centers = [sums[0] / totals[0], sums[1] / totals[1]];
    }

    if assignment.iter().all(|&a| a) || assignment.iter().all(|&a| !a) {
        return Ok(None);
    }

    let second_is_upper = centers[1] > centers[0];
    Ok(Some(
        assignment
            .into_iter()
            .map(|to_second| to_second == second_is_upper)
            .collect(),
    ))
}
