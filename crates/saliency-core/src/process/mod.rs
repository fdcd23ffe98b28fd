//! Sampling process factory.
//!
//! A process is declared once with everything that is fixed for a run
//! (shapes, thresholds, the scoring function) and then called many times
//! with nothing but a random key:
//!
//! 1. **Abstract phase**: [`AbstractProcess::bind`] accumulates parameters.
//!    Later binds overwrite earlier ones; nothing executes.
//! 2. **Concrete phase**: [`AbstractProcess::concretize`] checks that every
//!    required parameter is bound and returns a [`ConcreteProcess`], an
//!    immutable function of the key. The abstract process is frozen.
//!
//! Processes communicate through a [`Stream`](crate::stream::Stream) of
//! named tensors; [`sequential_call`] chains several into one.

mod factory;
mod params;
mod sequential;

pub use factory::{AbstractProcess, ConcreteProcess, ProcessBody, RESERVED_KEY};
pub use params::{Param, Params};
pub use sequential::{bind_all, concretize_all, sequential_call, BASE_STREAM};
