// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::IdealizeError;
use crate::constraints::Constraints;
use crate::control::{BudgetMode, BudgetStatus, CancelToken};
use std::time::Instant;

/// Unified execution context passed through idealization stages.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionContext<'a> {
    pub constraints: &'a Constraints,
    pub cancel: Option<&'a CancelToken>,
    pub budget_mode: BudgetMode,
}

impl<'a> ExecutionContext<'a> {
    /// Creates a context with safe defaults and no cancellation hook.
    pub fn new(constraints: &'a Constraints) -> Self {
        Self {
            constraints,
            cancel: None,
            budget_mode: BudgetMode::HardFail,
        }
    }

    /// Sets the optional cancellation token.
    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Sets the budget mode.
    pub fn with_budget_mode(mut self, budget_mode: BudgetMode) -> Self {
        self.budget_mode = budget_mode;
        self
    }

    /// Returns true when cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// Returns a cancelled error when cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), IdealizeError> {
        if self.is_cancelled() {
            return Err(IdealizeError::cancelled());
        }
        Ok(())
    }

    /// Checks cancellation every `every` iterations.
    ///
    /// When `every` is zero, it is treated as one (always poll).
    pub fn check_cancelled_every(
        &self,
        iteration: usize,
        every: usize,
    ) -> Result<(), IdealizeError> {
        let every = every.max(1);
        if iteration % every != 0 {
            return Ok(());
        }
        self.check_cancelled()
    }

    /// Checks the iteration budget and reports status based on configured mode.
    pub fn check_iteration_budget(&self, iterations: usize) -> Result<BudgetStatus, IdealizeError> {
        let Some(limit) = self.constraints.max_iterations else {
            return Ok(BudgetStatus::WithinBudget);
        };

        if iterations <= limit {
            return Ok(BudgetStatus::WithinBudget);
        }

        match self.budget_mode {
            BudgetMode::HardFail => Err(IdealizeError::resource_limit(format!(
                "constraints.max_iterations exceeded: used={iterations}, limit={limit}, budget_mode=HardFail"
            ))),
            BudgetMode::SoftDegrade => Ok(BudgetStatus::ExceededSoftDegrade),
        }
    }

    /// Checks elapsed time budget and reports status based on configured mode.
    pub fn check_time_budget(&self, started_at: Instant) -> Result<BudgetStatus, IdealizeError> {
        let Some(limit_ms) = self.constraints.time_budget_ms else {
            return Ok(BudgetStatus::WithinBudget);
        };

        let elapsed_ms = started_at.elapsed().as_millis();
        if elapsed_ms <= u128::from(limit_ms) {
            return Ok(BudgetStatus::WithinBudget);
        }

        match self.budget_mode {
            BudgetMode::HardFail => Err(IdealizeError::resource_limit(format!(
                "constraints.time_budget_ms exceeded: elapsed_ms={elapsed_ms}, limit_ms={limit_ms}, budget_mode=HardFail"
            ))),
            BudgetMode::SoftDegrade => Ok(BudgetStatus::ExceededSoftDegrade),
        }
    }

    /// Polls cancellation plus both budgets on a fixed cadence.
    ///
    /// Returns `true` when a soft budget was exceeded at this poll.
    pub fn poll(
        &self,
        iteration: usize,
        every: usize,
        started_at: Instant,
    ) -> Result<bool, IdealizeError> {
        let every = every.max(1);
        if iteration % every != 0 {
            return Ok(false);
        }
        self.check_cancelled()?;
        let iterations = self.check_iteration_budget(iteration)?;
        let time = self.check_time_budget(started_at)?;
        Ok(iterations == BudgetStatus::ExceededSoftDegrade
            || time == BudgetStatus::ExceededSoftDegrade)
    }
}
