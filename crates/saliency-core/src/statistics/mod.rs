//! Online statistics over sampled batches.
//!
//! This module provides the streaming half of the engine:
//! - Running mean / second moment updates with batch-size-independent weights
//! - The absolute-delta measure the stopping condition monitors
//! - Variance and standard deviation derived from the two running moments

mod moments;
mod update;

pub use moments::{std_dev, variance};
pub use update::{max_abs_diff, update_stats, UpdatePlan};
