// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use idl_core::{Event, IdealizeError, sampling_interval};

/// Run-length encodes an idealization into events.
///
/// Event boundaries fall where consecutive values differ. Durations include
/// one sampling interval, so a single-sample event lasts `dt`.
pub fn extract_events(idealization: &[f64], time: &[f64]) -> Result<Vec<Event>, IdealizeError> {
    if idealization.len() != time.len() {
        return Err(IdealizeError::invalid_input(format!(
            "idealization/time length mismatch: idealization={}, time={}",
            idealization.len(),
            time.len()
        )));
    }
    if idealization.is_empty() {
        return Ok(Vec::new());
    }

    let dt = sampling_interval(time);
    let mut events = Vec::new();
    let mut start = 0;
    for idx in 1..=idealization.len() {
        if idx < idealization.len() && idealization[idx] == idealization[start] {
            continue;
        }
        let end = idx - 1;
        events.push(Event {
            amplitude: idealization[start],
            duration: time[end] - time[start] + dt,
            t_start: time[start],
            t_end: time[end],
            start_index: start,
            end_index: end,
        });
        start = idx;
    }
    Ok(events)
}

/// Expands an event table back into an idealization of length `n`.
///
/// Events must tile `[0, n)` in order without gaps or overlap.
pub fn events_to_idealization(events: &[Event], n: usize) -> Result<Vec<f64>, IdealizeError> {
    let mut idealization = Vec::with_capacity(n);
    for (idx, event) in events.iter().enumerate() {
        if event.start_index != idealization.len() || event.end_index < event.start_index {
            return Err(IdealizeError::invalid_input(format!(
                "event {idx} covers [{}, {}] but the next free sample is {}",
                event.start_index,
                event.end_index,
                idealization.len()
            )));
        }
        idealization.extend(std::iter::repeat_n(event.amplitude, event.n_samples()));
    }
    if idealization.len() != n {
        return Err(IdealizeError::invalid_input(format!(
            "events cover {} samples; expected {n}",
            idealization.len()
        )));
    }
    Ok(idealization)
}
