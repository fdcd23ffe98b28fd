//! Convergence loop for streaming statistics.
//!
//! # Key Components
//!
//! - **StoppingCondition**: delta threshold plus batch budget
//! - **while_loop**: pure loop combinator the driver is built on
//! - **GatherLoop**: sample-and-update step and its run loop
//! - **initial_stats**: zeroed accumulator shaped like a first sample

mod gather;
mod stopping;
mod while_loop;

pub use gather::{gather_stats, init_loop, initial_stats, GatherConfig, GatherLoop, GatherOutcome};
pub use stopping::{should_continue, Decision, StopReason, StoppingCondition};
pub use while_loop::while_loop;
