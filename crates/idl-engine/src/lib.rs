// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Idealization entry point: threshold crossing or DISC, event extraction,
//! resolution enforcement and the per-episode cache.

pub mod cache;
pub mod episode;
pub mod events;
pub mod idealizer;
pub mod interpolate;
pub mod resolution;
pub mod threshold;

pub use cache::{CachedIdealization, IdealizationCache};
pub use episode::{Episode, EpisodeId, Series};
pub use events::{events_to_idealization, extract_events};
pub use idealizer::{IdealizationParams, Idealized, Strategy, idealize};
pub use interpolate::{Resampled, interpolate};
pub use resolution::{RESOLUTION_SLACK, ResolutionOutcome, apply_resolution};
pub use threshold::{ThresholdOutcome, threshold_crossing};
