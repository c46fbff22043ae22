// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::episode::{EpisodeId, Series};
use crate::idealizer::{IdealizationParams, idealize};
use idl_core::{
    BudgetMode, CancelToken, Constraints, Diagnostics, Event, ExecutionContext, IdealizeError,
};
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const EPISODE_SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Stored result for one episode under one parameter generation.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedIdealization {
    pub episode_id: EpisodeId,
    pub generation: u64,
    pub idealization: Vec<f64>,
    pub time: Vec<f64>,
    pub events: Vec<Event>,
    pub diagnostics: Diagnostics,
}

type SlotKey = (EpisodeId, u64);

struct CacheState {
    series: Arc<Series>,
    params: Arc<IdealizationParams>,
    generation: u64,
    entries: HashMap<EpisodeId, Arc<CachedIdealization>>,
    slots: HashMap<SlotKey, Arc<Mutex<()>>>,
}

impl CacheState {
    fn invalidate(&mut self) {
        self.generation += 1;
        self.entries.clear();
        self.slots.clear();
    }
}

/// Per-episode idealization store for one series under one parameter set.
///
/// At most one computation runs per `(episode, generation)`. Changing the
/// parameters, clearing, or replacing the series drops every entry and
/// installs a fresh cancellation token; results computed against a superseded
/// generation are never published.
pub struct IdealizationCache {
    state: RwLock<CacheState>,
    computations: AtomicUsize,
    constraints: Constraints,
    budget_mode: BudgetMode,
    cancel: Mutex<CancelToken>,
}

impl IdealizationCache {
    pub fn new(series: Series, params: IdealizationParams) -> Result<Self, IdealizeError> {
        params.validate()?;
        Ok(Self {
            state: RwLock::new(CacheState {
                series: Arc::new(series),
                params: Arc::new(params),
                generation: 0,
                entries: HashMap::new(),
                slots: HashMap::new(),
            }),
            computations: AtomicUsize::new(0),
            constraints: Constraints::default(),
            budget_mode: BudgetMode::HardFail,
            cancel: Mutex::new(CancelToken::new()),
        })
    }

    /// Applies run limits to every later computation.
    pub fn with_constraints(
        mut self,
        constraints: Constraints,
        budget_mode: BudgetMode,
    ) -> Result<Self, IdealizeError> {
        constraints.validate()?;
        self.constraints = constraints;
        self.budget_mode = budget_mode;
        Ok(self)
    }

    /// Token that aborts in-flight computations when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.lock().clone()
    }

    /// Replaces a cancelled token so later computations can run again.
    /// Tokens handed out earlier keep their state.
    pub fn reset_cancellation(&self) {
        *self.cancel.lock() = CancelToken::new();
    }

    /// Number of idealizations computed so far, including discarded stale ones.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn params(&self) -> Arc<IdealizationParams> {
        Arc::clone(&self.state.read().params)
    }

    pub fn series(&self) -> Arc<Series> {
        Arc::clone(&self.state.read().series)
    }

    /// Idealizes one episode unless it is already cached.
    pub fn idealize_episode(
        &self,
        id: EpisodeId,
    ) -> Result<Arc<CachedIdealization>, IdealizeError> {
        loop {
            let (slot, generation, series, params) = {
                let mut state = self.state.write();
                if let Some(entry) = state.entries.get(&id) {
                    return Ok(Arc::clone(entry));
                }
                if state.series.episode(id).is_none() {
                    return Err(IdealizeError::invalid_input(format!(
                        "unknown episode id {id}"
                    )));
                }
                let generation = state.generation;
                let slot = Arc::clone(state.slots.entry((id, generation)).or_default());
                (
                    slot,
                    generation,
                    Arc::clone(&state.series),
                    Arc::clone(&state.params),
                )
            };

            let _guard = slot.lock();
            {
                let state = self.state.read();
                if state.generation == generation
                    && let Some(entry) = state.entries.get(&id)
                {
                    return Ok(Arc::clone(entry));
                }
            }

            let computed = match self.compute(&series, &params, id, generation) {
                Ok(computed) => computed,
                Err(err) => {
                    self.state.write().slots.remove(&(id, generation));
                    return Err(err);
                }
            };

            let mut state = self.state.write();
            if state.generation != generation {
                tracing::debug!(
                    episode = id,
                    generation,
                    current = state.generation,
                    "discarding idealization from superseded generation"
                );
                continue;
            }
            let entry = Arc::new(computed);
            state.entries.insert(id, Arc::clone(&entry));
            state.slots.remove(&(id, generation));
            return Ok(entry);
        }
    }

    fn compute(
        &self,
        series: &Series,
        params: &IdealizationParams,
        id: EpisodeId,
        generation: u64,
    ) -> Result<CachedIdealization, IdealizeError> {
        let episode = series
            .episode(id)
            .ok_or_else(|| IdealizeError::invalid_input(format!("unknown episode id {id}")))?;
        let trace = episode.view()?;
        let cancel = self.cancel_token();
        let ctx = ExecutionContext::new(&self.constraints)
            .with_cancel(&cancel)
            .with_budget_mode(self.budget_mode);
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed ^ id.wrapping_mul(EPISODE_SEED_MIX));

        let result = idealize(&trace, params, &mut rng, &ctx)?;
        self.computations.fetch_add(1, Ordering::Relaxed);

        Ok(CachedIdealization {
            episode_id: id,
            generation,
            idealization: result.idealization,
            time: result.time,
            events: result.events,
            diagnostics: result.diagnostics,
        })
    }

    /// Idealizes every episode of the series that is not cached yet.
    pub fn idealize_series(&self) -> Result<(), IdealizeError> {
        let pending: Vec<EpisodeId> = {
            let state = self.state.read();
            state
                .series
                .ids()
                .into_iter()
                .filter(|id| !state.entries.contains_key(id))
                .collect()
        };

        #[cfg(feature = "rayon")]
        let outcome = {
            use rayon::prelude::*;
            pending
                .par_iter()
                .try_for_each(|&id| self.idealize_episode(id).map(|_| ()))
        };
        #[cfg(not(feature = "rayon"))]
        let outcome = pending
            .iter()
            .try_for_each(|&id| self.idealize_episode(id).map(|_| ()));

        outcome
    }

    /// Drops every cached entry.
    pub fn clear_idealization(&self) {
        self.state.write().invalidate();
        self.reset_cancellation();
    }

    pub fn entry(&self, id: EpisodeId) -> Option<Arc<CachedIdealization>> {
        self.state.read().entries.get(&id).cloned()
    }

    pub fn idealization(&self, id: EpisodeId) -> Option<Vec<f64>> {
        self.entry(id).map(|entry| entry.idealization.clone())
    }

    pub fn time(&self, id: EpisodeId) -> Option<Vec<f64>> {
        self.entry(id).map(|entry| entry.time.clone())
    }

    pub fn events(&self, id: EpisodeId) -> Option<Vec<Event>> {
        self.entry(id).map(|entry| entry.events.clone())
    }

    /// Installs a new parameter set. Returns `true` when it differed from the
    /// current one and the cache was invalidated.
    pub fn set_params(&self, params: IdealizationParams) -> Result<bool, IdealizeError> {
        params.validate()?;
        let mut state = self.state.write();
        if *state.params == params {
            return Ok(false);
        }
        state.params = Arc::new(params);
        state.invalidate();
        drop(state);
        self.reset_cancellation();
        Ok(true)
    }

    /// Swaps in a new series (for example after filtering) and invalidates.
    pub fn replace_series(&self, series: Series) {
        let mut state = self.state.write();
        state.series = Arc::new(series);
        state.invalidate();
        drop(state);
        self.reset_cancellation();
    }

    #[cfg(test)]
    fn pending_slots(&self) -> usize {
        self.state.read().slots.len()
    }
}
