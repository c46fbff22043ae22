// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::events::extract_events;
use idl_core::{Event, IdealizeError, sampling_interval};
use rand::Rng;

/// Fraction of one sampling interval by which an event may fall short of the
/// resolution and still count as resolved.
pub const RESOLUTION_SLACK: f64 = 1.0e-6;

/// Result of [`apply_resolution`].
#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionOutcome {
    pub idealization: Vec<f64>,
    pub events: Vec<Event>,
    pub merges: usize,
    pub warnings: Vec<String>,
}

/// Merges every event shorter than `resolution` into a neighbour.
///
/// The shortest offending event goes first. It merges into its right-hand
/// neighbour when it is the first event or when a fair coin drawn from `rng`
/// says so, otherwise into its left-hand neighbour; the last event always
/// merges left. The neighbour keeps its amplitude. Equal-amplitude neighbours
/// created by a merge are fused.
pub fn apply_resolution<R: Rng + ?Sized>(
    idealization: &[f64],
    time: &[f64],
    resolution: f64,
    rng: &mut R,
) -> Result<ResolutionOutcome, IdealizeError> {
    if !resolution.is_finite() {
        return Err(IdealizeError::invalid_input(format!(
            "resolution must be finite; got {resolution}"
        )));
    }

    let mut events = extract_events(idealization, time)?;
    let mut idealization = idealization.to_vec();
    let mut warnings = Vec::new();
    let mut merges = 0;

    if resolution <= 0.0 {
        return Ok(ResolutionOutcome {
            idealization,
            events,
            merges,
            warnings,
        });
    }

    let dt = sampling_interval(time);
    let limit = resolution - RESOLUTION_SLACK * dt;

    while events.len() > 1 {
        let Some(shortest) = shortest_violation(&events, limit) else {
            break;
        };

        let last = events.len() - 1;
        let into_right = shortest != last && (shortest == 0 || rng.gen_bool(0.5));
        let survivor = if into_right { shortest + 1 } else { shortest - 1 };

        let absorbed = events[shortest];
        idealization[absorbed.start_index..=absorbed.end_index].fill(events[survivor].amplitude);
        absorb(&mut events[survivor], &absorbed, dt);
        events.remove(shortest);
        merges += 1;

        let survivor = if into_right { shortest } else { shortest - 1 };
        coalesce_around(&mut events, survivor, dt);
    }

    if events.len() == 1 && events[0].duration < limit {
        let message = format!(
            "resolution {resolution} not enforced: the whole trace is a single event of duration {}",
            events[0].duration
        );
        tracing::warn!(resolution, duration = events[0].duration, "{message}");
        warnings.push(message);
    }

    Ok(ResolutionOutcome {
        idealization,
        events,
        merges,
        warnings,
    })
}

/// First event with the smallest duration below `limit`.
fn shortest_violation(events: &[Event], limit: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, event) in events.iter().enumerate() {
        if event.duration >= limit {
            continue;
        }
        if best.is_none_or(|(_, duration)| event.duration < duration) {
            best = Some((idx, event.duration));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Extends `survivor` over `absorbed`; the duration is re-derived from the
/// new bounds so it matches a fresh extraction exactly.
fn absorb(survivor: &mut Event, absorbed: &Event, dt: f64) {
    if absorbed.start_index < survivor.start_index {
        survivor.start_index = absorbed.start_index;
        survivor.t_start = absorbed.t_start;
    }
    if absorbed.end_index > survivor.end_index {
        survivor.end_index = absorbed.end_index;
        survivor.t_end = absorbed.t_end;
    }
    survivor.duration = survivor.t_end - survivor.t_start + dt;
}

/// Fuses `events[idx]` with any neighbour of the same amplitude.
fn coalesce_around(events: &mut Vec<Event>, idx: usize, dt: f64) {
    let mut idx = idx;
    if idx > 0 && events[idx - 1].amplitude == events[idx].amplitude {
        let right = events.remove(idx);
        absorb(&mut events[idx - 1], &right, dt);
        idx -= 1;
    }
    if idx + 1 < events.len() && events[idx + 1].amplitude == events[idx].amplitude {
        let right = events.remove(idx + 1);
        absorb(&mut events[idx], &right, dt);
    }
}
