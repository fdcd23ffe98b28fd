//! Helpers for declaring many processes and chaining them into one.

use crate::error::Result;
use crate::stream::Stream;

use super::factory::{AbstractProcess, ConcreteProcess};
use super::params::Param;

/// Parameter holding the tensors a chain starts from.
pub const BASE_STREAM: &str = "base_stream";

/// Bind the same parameter on every process.
pub fn bind_all(processes: &mut [AbstractProcess], name: &str, value: Param) -> Result<()> {
    for process in processes.iter_mut() {
        process.bind(name, value.clone())?;
    }
    Ok(())
}

/// Concretize every process, failing on the first missing parameter.
pub fn concretize_all(processes: &mut [AbstractProcess]) -> Result<Vec<ConcreteProcess>> {
    processes.iter_mut().map(AbstractProcess::concretize).collect()
}

/// Chain concrete processes into one abstract process.
///
/// The concretized chain starts from the bound `base_stream` (empty by
/// default) and runs each step in order on the same stream, so later steps
/// read what earlier steps wrote. Step `i` receives `key.fold_in(i)`.
pub fn sequential_call(steps: Vec<ConcreteProcess>) -> AbstractProcess {
    AbstractProcess::new("sequential_call", &[], move |key, params, stream| {
        for (name, tensor) in params.stream(BASE_STREAM)? {
            stream
                .entry(name.clone())
                .or_insert_with(|| tensor.clone());
        }
        for (i, step) in steps.iter().enumerate() {
            step.call_with(&key.fold_in(i as u64), stream)?;
        }
        Ok(())
    })
    .with_default(BASE_STREAM, Stream::new())
}
