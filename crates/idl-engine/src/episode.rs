// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use idl_core::{IdealizeError, TraceView, validate_finite};
use idl_filter::AdaptiveFilter;
use std::collections::HashSet;

/// Identifier of an episode within a series.
pub type EpisodeId = u64;

/// One recorded sweep.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Episode {
    pub id: EpisodeId,
    pub trace: Vec<f64>,
    pub time: Vec<f64>,
    /// Samples per time unit.
    pub sampling_rate: f64,
}

impl Episode {
    pub fn new(
        id: EpisodeId,
        trace: Vec<f64>,
        time: Vec<f64>,
        sampling_rate: f64,
    ) -> Result<Self, IdealizeError> {
        let episode = Self {
            id,
            trace,
            time,
            sampling_rate,
        };
        episode.validate()?;
        Ok(episode)
    }

    /// Builds an episode on a uniform time base starting at zero.
    pub fn uniform(id: EpisodeId, trace: Vec<f64>, sampling_rate: f64) -> Result<Self, IdealizeError> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(IdealizeError::invalid_input(format!(
                "episode {id}: sampling_rate must be finite and > 0; got {sampling_rate}"
            )));
        }
        let time = (0..trace.len()).map(|i| i as f64 / sampling_rate).collect();
        Self::new(id, trace, time, sampling_rate)
    }

    pub fn validate(&self) -> Result<(), IdealizeError> {
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(IdealizeError::invalid_input(format!(
                "episode {}: sampling_rate must be finite and > 0; got {}",
                self.id, self.sampling_rate
            )));
        }
        self.view().map(|_| ())
    }

    pub fn view(&self) -> Result<TraceView<'_>, IdealizeError> {
        TraceView::new(&self.trace, &self.time)
            .map_err(|err| IdealizeError::invalid_input(format!("episode {}: {err}", self.id)))
    }
}

/// Ordered collection of episodes with unique ids.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Series {
    episodes: Vec<Episode>,
}

impl Series {
    pub fn new(episodes: Vec<Episode>) -> Result<Self, IdealizeError> {
        let mut seen = HashSet::with_capacity(episodes.len());
        for episode in &episodes {
            if !seen.insert(episode.id) {
                return Err(IdealizeError::invalid_input(format!(
                    "duplicate episode id {}",
                    episode.id
                )));
            }
            episode.validate()?;
        }
        Ok(Self { episodes })
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn episode(&self, id: EpisodeId) -> Option<&Episode> {
        self.episodes.iter().find(|episode| episode.id == id)
    }

    pub fn ids(&self) -> Vec<EpisodeId> {
        self.episodes.iter().map(|episode| episode.id).collect()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Returns a copy with every trace passed through `filter`.
    pub fn filtered(&self, filter: &AdaptiveFilter) -> Result<Self, IdealizeError> {
        let episodes = self
            .episodes
            .iter()
            .map(|episode| {
                let trace = filter.apply(&episode.trace);
                validate_finite("filtered trace", &trace)?;
                Ok(Episode {
                    trace,
                    ..episode.clone()
                })
            })
            .collect::<Result<Vec<_>, IdealizeError>>()?;
        Ok(Self { episodes })
    }
}
