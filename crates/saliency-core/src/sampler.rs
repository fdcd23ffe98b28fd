//! Batch sampler: independent keys in, stacked named outputs out.
//!
//! For batch `b` of a run seeded with `s`, the root key is derived from
//! `s + b`, split into `batch_size` subkeys, and the concrete process is
//! mapped over them. Lanes have no data dependency, so with the `parallel`
//! feature they run on the rayon pool; the collect keeps lane order, so the
//! result is bit-identical to the sequential map.

use ndarray::{ArrayViewD, Axis};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{Result, SaliencyError};
use crate::process::ConcreteProcess;
use crate::stream::{Stream, StreamName};
use crate::types::{Key, Tensor};

/// A concrete process lifted to act on a slice of keys.
#[derive(Debug, Clone)]
pub struct VectorizedProcess {
    process: ConcreteProcess,
}

impl VectorizedProcess {
    /// Vectorize a concrete process.
    pub fn new(process: ConcreteProcess) -> Self {
        Self { process }
    }

    /// The underlying per-key process.
    pub fn inner(&self) -> &ConcreteProcess {
        &self.process
    }

    /// Map the process over `keys` and stack every output on a new axis 0.
    ///
    /// # Errors
    ///
    /// Propagates the first lane error; `MissingOutput` if lanes disagree on
    /// their output names, `ShapeMismatch` if they disagree on a shape.
    pub fn call(&self, keys: &[Key]) -> Result<Batch> {
        if keys.is_empty() {
            return Err(SaliencyError::InvalidConfig(
                "batch_size must be > 0".to_string(),
            ));
        }

        #[cfg(feature = "parallel")]
        let lanes: Vec<Stream> = keys
            .par_iter()
            .map(|key| self.process.call(key))
            .collect::<Result<_>>()?;

        #[cfg(not(feature = "parallel"))]
        let lanes: Vec<Stream> = keys
            .iter()
            .map(|key| self.process.call(key))
            .collect::<Result<_>>()?;

        stack_lanes(&lanes).map(|outputs| Batch {
            outputs,
            size: keys.len(),
        })
    }
}

impl From<ConcreteProcess> for VectorizedProcess {
    fn from(process: ConcreteProcess) -> Self {
        Self::new(process)
    }
}

fn stack_lanes(lanes: &[Stream]) -> Result<Stream> {
    let mut outputs = Stream::new();
    let Some(first) = lanes.first() else {
        return Ok(outputs);
    };

    for (name, reference) in first {
        let views = lanes
            .iter()
            .map(|lane| {
                let tensor = lane
                    .get(name)
                    .ok_or_else(|| SaliencyError::MissingOutput(name.clone()))?;
                if tensor.shape() != reference.shape() {
                    return Err(SaliencyError::ShapeMismatch {
                        stream: name.to_string(),
                        expected: reference.shape().to_vec(),
                        found: tensor.shape().to_vec(),
                    });
                }
                Ok(tensor.view())
            })
            .collect::<Result<Vec<ArrayViewD<'_, f32>>>>()?;

        let stacked = ndarray::stack(Axis(0), &views).map_err(|_| {
            SaliencyError::ShapeMismatch {
                stream: name.to_string(),
                expected: reference.shape().to_vec(),
                found: Vec::new(),
            }
        })?;
        outputs.insert(name.clone(), stacked);
    }
    Ok(outputs)
}

/// Outputs of one batch, each stacked along axis 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    outputs: Stream,
    size: usize,
}

impl Batch {
    /// Build a batch from already stacked outputs (used by tests and by
    /// callers that produce samples outside a process).
    pub fn from_outputs(outputs: Stream) -> Result<Self> {
        let mut sizes = outputs.values().map(|t| t.shape().first().copied());
        let size = match sizes.next() {
            Some(Some(size)) => size,
            Some(None) => {
                return Err(SaliencyError::InvalidConfig(
                    "batched outputs need a leading batch axis".to_string(),
                ))
            }
            None => 0,
        };
        if sizes.any(|s| s != Some(size)) {
            return Err(SaliencyError::InvalidConfig(
                "batched outputs disagree on batch size".to_string(),
            ));
        }
        Ok(Self { outputs, size })
    }

    /// Number of lanes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Stacked output by name.
    pub fn get(&self, name: &StreamName) -> Option<&Tensor> {
        self.outputs.get(name)
    }

    /// All stacked outputs.
    pub fn outputs(&self) -> &Stream {
        &self.outputs
    }

    /// Consume into the stacked outputs.
    pub fn into_outputs(self) -> Stream {
        self.outputs
    }
}

/// Keys for batch `batch_index` of a run seeded with `seed`.
///
/// A pure function of its three arguments.
pub fn batch_keys(seed: u64, batch_index: usize, batch_size: usize) -> Vec<Key> {
    Key::new(seed.wrapping_add(batch_index as u64)).split(batch_size)
}

/// Draw one batch: derive the keys for `(seed, batch_index)` and map the
/// vectorized process over them.
pub fn sample(
    seed: u64,
    batch_index: usize,
    batch_size: usize,
    process: &VectorizedProcess,
) -> Result<Batch> {
    process.call(&batch_keys(seed, batch_index, batch_size))
}
