//! Convergence loop driver.
//!
//! [`init_loop`] concretizes the sampling process, checks the accumulator
//! against the update plan and builds the stopping condition;
//! [`GatherLoop::run`] then repeats
//!
//! 1. advance the batch counter,
//! 2. sample a batch with the new counter,
//! 3. fold it into the running statistics,
//!
//! until the stopping condition says otherwise.

use serde::{Deserialize, Serialize};

use crate::accumulator::Accumulator;
use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_BATCHES, DEFAULT_MIN_CHANGE, DEFAULT_SEED};
use crate::error::{Result, SaliencyError};
use crate::process::AbstractProcess;
use crate::sampler::{sample, VectorizedProcess};
use crate::statistics::{update_stats, UpdatePlan};
use crate::stream::{Statistic, Stream, StreamKey, StreamName};

use super::stopping::{Decision, StopReason, StoppingCondition};
use super::while_loop::while_loop;

/// Configuration of one gathering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatherConfig {
    /// Base seed; batch `b` draws from `seed + b`.
    pub seed: u64,

    /// Keys drawn per batch. Must stay constant for a run.
    pub batch_size: usize,

    /// Batch budget.
    pub max_batches: usize,

    /// Stop once the monitored delta falls below this.
    pub min_change: f32,

    /// Statistic whose change is monitored.
    pub monitored_source: StreamKey,

    /// Absolute-delta key that receives the change.
    pub monitored_delta: StreamKey,
}

impl Default for GatherConfig {
    fn default() -> Self {
        let source = StreamKey::second_moment(StreamName::VANILLA_GRAD_MASK);
        let delta = source.delta();
        Self::new(source, delta)
    }
}

impl GatherConfig {
    /// Config monitoring `source` through `delta`, other fields at defaults.
    pub fn new(monitored_source: StreamKey, monitored_delta: StreamKey) -> Self {
        Self {
            seed: DEFAULT_SEED,
            batch_size: DEFAULT_BATCH_SIZE,
            max_batches: DEFAULT_MAX_BATCHES,
            min_change: DEFAULT_MIN_CHANGE,
            monitored_source,
            monitored_delta,
        }
    }

    /// Builder method to set the seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to set the batch size.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size` is zero.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0 (got {})", batch_size);
        self.batch_size = batch_size;
        self
    }

    /// Builder method to set the batch budget.
    ///
    /// # Panics
    ///
    /// Panics if `max_batches` is zero.
    pub fn max_batches(mut self, max_batches: usize) -> Self {
        assert!(max_batches > 0, "max_batches must be > 0 (got {})", max_batches);
        self.max_batches = max_batches;
        self
    }

    /// Builder method to set the convergence threshold.
    ///
    /// # Panics
    ///
    /// Panics unless `min_change` is positive.
    pub fn min_change(mut self, min_change: f32) -> Self {
        assert!(min_change > 0.0, "min_change must be > 0 (got {})", min_change);
        self.min_change = min_change;
        self
    }

    /// Check a config that did not go through the builder.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SaliencyError::InvalidConfig(
                "batch_size must be > 0".to_string(),
            ));
        }
        self.stopping_condition().map(|_| ())
    }

    /// The stopping condition this config describes.
    pub fn stopping_condition(&self) -> Result<StoppingCondition> {
        StoppingCondition::new(
            self.max_batches,
            self.min_change,
            self.monitored_delta.clone(),
        )
    }
}

/// Final state of a gathering run.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherOutcome {
    /// Converged (or budget-limited) statistics.
    pub stats: Accumulator,

    /// Why the loop stopped.
    pub reason: StopReason,
}

impl GatherOutcome {
    /// Whether the monitored statistic converged.
    pub fn is_converged(&self) -> bool {
        self.reason.is_converged()
    }

    /// Batches drawn.
    pub fn batches(&self) -> usize {
        self.stats.batch_index()
    }
}

/// A ready-to-run convergence loop.
#[derive(Debug, Clone)]
pub struct GatherLoop {
    process: VectorizedProcess,
    plan: UpdatePlan,
    stopping: StoppingCondition,
    seed: u64,
    batch_size: usize,
}

impl GatherLoop {
    /// The stopping condition in use.
    pub fn stopping(&self) -> &StoppingCondition {
        &self.stopping
    }

    /// The update plan in use.
    pub fn plan(&self) -> &UpdatePlan {
        &self.plan
    }

    /// One loop iteration: advance the counter, sample, update.
    pub fn step(&self, stats: Accumulator) -> Result<Accumulator> {
        let stats = stats.advance();
        let batch_index = stats.batch_index();
        let batch = sample(self.seed, batch_index, self.batch_size, &self.process)?;
        let stats = update_stats(&batch, stats, batch_index, &self.plan)?;
        tracing::debug!(
            batch_index,
            delta = stats.scalar(self.plan.delta()).unwrap_or(f32::NAN),
            "sampled batch"
        );
        Ok(stats)
    }

    /// Run until the stopping condition fires.
    pub fn run(&self, init: Accumulator) -> Result<GatherOutcome> {
        self.run_observed(init, |_| {})
    }

    /// Like [`run`](Self::run), calling `observer` after every batch.
    pub fn run_observed<F>(&self, init: Accumulator, observer: F) -> Result<GatherOutcome>
    where
        F: Fn(&Accumulator),
    {
        let stats = while_loop(
            |stats| self.stopping.should_continue(stats),
            |stats| {
                let stats = self.step(stats)?;
                observer(&stats);
                Ok(stats)
            },
            init,
        )?;

        let reason = match self.stopping.evaluate(&stats)? {
            Decision::Stop(reason) => reason,
            Decision::Continue => {
                return Err(SaliencyError::InvalidConfig(
                    "loop ended without a stop decision".to_string(),
                ))
            }
        };

        match reason {
            StopReason::Converged { .. } => {
                tracing::info!(batches = reason.batches(), delta = reason.delta(), "converged");
            }
            StopReason::BudgetExhausted { .. } => {
                tracing::warn!(
                    batches = reason.batches(),
                    delta = reason.delta(),
                    min_change = self.stopping.min_change(),
                    "batch budget exhausted before convergence"
                );
            }
        }

        Ok(GatherOutcome { stats, reason })
    }
}

/// Prepare a convergence loop.
///
/// Concretizes `process` (freezing it), derives the update plan from the
/// running moments present in `stats`, and validates everything eagerly.
pub fn init_loop(
    config: &GatherConfig,
    process: &mut AbstractProcess,
    stats: &Accumulator,
) -> Result<GatherLoop> {
    config.validate()?;
    let plan = UpdatePlan::from_accumulator(
        stats,
        config.monitored_source.clone(),
        config.monitored_delta.clone(),
    )?;
    plan.validate(stats)?;
    let process = VectorizedProcess::new(process.concretize()?);
    tracing::debug!(
        process = process.inner().name(),
        tracked = plan.tracked().len(),
        batch_size = config.batch_size,
        max_batches = config.max_batches,
        "initialized gather loop"
    );
    Ok(GatherLoop {
        process,
        plan,
        stopping: config.stopping_condition()?,
        seed: config.seed,
        batch_size: config.batch_size,
    })
}

/// Gather running statistics of `process` until convergence or budget.
pub fn gather_stats(
    config: &GatherConfig,
    process: &mut AbstractProcess,
    stats: Accumulator,
) -> Result<GatherOutcome> {
    init_loop(config, process, &stats)?.run(stats)
}

/// Zeroed accumulator shaped like `first_sample`.
///
/// Every output of the sample gets one zero tensor per running-moment kind
/// in `statistics`; `monitored_delta` is seeded with `+inf` so the loop
/// always draws at least one batch.
pub fn initial_stats(
    first_sample: &Stream,
    statistics: &[Statistic],
    monitored_delta: &StreamKey,
) -> Accumulator {
    let mut stats = Accumulator::new();
    for (name, tensor) in first_sample {
        for statistic in statistics.iter().filter(|s| s.is_running_moment()) {
            stats = stats.with_zeros(StreamKey::new(name.clone(), *statistic), tensor.shape());
        }
    }
    stats.with_unconverged_delta(monitored_delta.clone())
}
