//! Core streaming statistics for stochastic saliency sampling.
//!
//! This crate provides the machinery that turns a parameterized stochastic
//! process into converged running moments:
//!
//! - a two-phase process factory (bind parameters, then concretize),
//! - a deterministic batch sampler that maps a process over independent keys,
//! - an online updater for running mean / second moment streams,
//! - a stopping condition on the change of one monitored statistic,
//! - a pure convergence loop driving the whole thing.
//!
//! The neural network, masks and explanation methods live in the `saliency`
//! crate; this crate only knows about named tensors.
//!
//! # Features
//!
//! - `parallel` (default): evaluate the lanes of a batch on the rayon pool
//!
//! # Usage
//!
//! ```ignore
//! use saliency_core::{
//!     adaptive::{gather_stats, initial_stats, GatherConfig},
//!     stream::{Statistic, StreamKey, StreamName},
//! };
//!
//! let source = StreamKey::new(StreamName::VANILLA_GRAD_MASK, Statistic::SecondMoment);
//! let config = GatherConfig::new(source.clone(), source.delta()).batch_size(32);
//! let outcome = gather_stats(&config, &mut process, stats)?;
//! println!("{} after {} batches", outcome.reason, outcome.batches());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accumulator;
pub mod adaptive;
pub mod constants;
pub mod error;
pub mod process;
pub mod sampler;
pub mod statistics;
pub mod stream;
pub mod types;

// Re-export commonly used items at crate root
pub use accumulator::Accumulator;
pub use adaptive::{
    gather_stats, initial_stats, should_continue, Decision, GatherConfig, GatherOutcome,
    StopReason, StoppingCondition,
};
pub use error::{Result, SaliencyError};
pub use process::{AbstractProcess, ConcreteProcess, Param, Params};
pub use sampler::{sample, Batch, VectorizedProcess};
pub use statistics::{update_stats, UpdatePlan};
pub use stream::{Statistic, Stream, StreamKey, StreamName};
pub use types::{Key, Tensor};
