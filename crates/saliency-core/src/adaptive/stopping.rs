//! Stopping condition for the convergence loop.
//!
//! The loop keeps drawing batches while the monitored delta is still at or
//! above `min_change` and the batch budget is not spent:
//!
//! ```text
//! continue  <=>  delta >= min_change  &&  batch_index < max_batches
//! ```
//!
//! Both checks are made against the accumulator snapshot the loop carries,
//! so the condition is a pure function of the state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::accumulator::Accumulator;
use crate::error::{Result, SaliencyError};
use crate::stream::{Statistic, StreamKey};

/// Result of evaluating the stopping condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Draw another batch.
    Continue,

    /// Stop the loop.
    Stop(StopReason),
}

impl Decision {
    /// Whether the loop should draw another batch.
    pub fn is_continue(&self) -> bool {
        matches!(self, Decision::Continue)
    }
}

/// Why the convergence loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The monitored statistic changed by less than `min_change` in the last
    /// batch.
    Converged {
        /// Final monitored delta.
        delta: f32,
        /// Batches drawn.
        batches: usize,
    },

    /// The batch budget ran out while the statistic was still moving.
    ///
    /// Not an error: the statistics gathered so far are returned as-is.
    BudgetExhausted {
        /// Final monitored delta.
        delta: f32,
        /// Batches drawn.
        batches: usize,
    },
}

impl StopReason {
    /// Batches drawn before stopping.
    pub fn batches(&self) -> usize {
        match self {
            StopReason::Converged { batches, .. } | StopReason::BudgetExhausted { batches, .. } => {
                *batches
            }
        }
    }

    /// Monitored delta at the time of stopping.
    pub fn delta(&self) -> f32 {
        match self {
            StopReason::Converged { delta, .. } | StopReason::BudgetExhausted { delta, .. } => {
                *delta
            }
        }
    }

    /// Whether the statistic converged before the budget ran out.
    pub fn is_converged(&self) -> bool {
        matches!(self, StopReason::Converged { .. })
    }

    /// Short machine-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Converged { .. } => "converged",
            StopReason::BudgetExhausted { .. } => "budget_exhausted",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Converged { delta, batches } => {
                write!(f, "converged (delta {delta:.3e} after {batches} batches)")
            }
            StopReason::BudgetExhausted { delta, batches } => {
                write!(
                    f,
                    "batch budget exhausted (delta {delta:.3e} after {batches} batches)"
                )
            }
        }
    }
}

/// Stopping condition over one monitored absolute-delta stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppingCondition {
    max_batches: usize,
    min_change: f32,
    monitored: StreamKey,
}

impl StoppingCondition {
    /// Build a stopping condition.
    ///
    /// # Errors
    ///
    /// `MonitoredKeyNotDelta` unless `monitored` is an `abs_delta` key;
    /// `InvalidConfig` for a zero budget or a non-positive threshold.
    pub fn new(max_batches: usize, min_change: f32, monitored: StreamKey) -> Result<Self> {
        if monitored.statistic != Statistic::AbsDelta {
            return Err(SaliencyError::MonitoredKeyNotDelta(monitored));
        }
        if max_batches == 0 {
            return Err(SaliencyError::InvalidConfig(
                "max_batches must be > 0".to_string(),
            ));
        }
        if !(min_change > 0.0) {
            return Err(SaliencyError::InvalidConfig(
                "min_change must be > 0".to_string(),
            ));
        }
        Ok(Self {
            max_batches,
            min_change,
            monitored,
        })
    }

    /// Batch budget.
    pub fn max_batches(&self) -> usize {
        self.max_batches
    }

    /// Convergence threshold.
    pub fn min_change(&self) -> f32 {
        self.min_change
    }

    /// Monitored delta key.
    pub fn monitored(&self) -> &StreamKey {
        &self.monitored
    }

    /// Decide whether to continue, and if not, why.
    ///
    /// Convergence is reported in preference to budget exhaustion when both
    /// hold on the same batch.
    pub fn evaluate(&self, stats: &Accumulator) -> Result<Decision> {
        let delta = stats.scalar(&self.monitored)?;
        if delta.is_nan() {
            return Err(SaliencyError::NonFinite(self.monitored.clone()));
        }
        let batches = stats.batch_index();

        if delta < self.min_change {
            return Ok(Decision::Stop(StopReason::Converged { delta, batches }));
        }
        if batches >= self.max_batches {
            return Ok(Decision::Stop(StopReason::BudgetExhausted { delta, batches }));
        }
        Ok(Decision::Continue)
    }

    /// `true` iff another batch should be drawn.
    pub fn should_continue(&self, stats: &Accumulator) -> Result<bool> {
        self.evaluate(stats).map(|d| d.is_continue())
    }
}

/// One-shot form of [`StoppingCondition::should_continue`].
pub fn should_continue(
    stats: &Accumulator,
    max_batches: usize,
    min_change: f32,
    monitored: StreamKey,
) -> Result<bool> {
    StoppingCondition::new(max_batches, min_change, monitored)?.should_continue(stats)
}
