//! Accumulator state carried through the convergence loop.
//!
//! The accumulator maps [`StreamKey`]s to running statistic tensors and holds
//! the 1-based batch counter. The loop never mutates a shared accumulator:
//! each step takes the previous snapshot by value and returns the next one.

use std::collections::btree_map;
use std::collections::BTreeMap;

use ndarray::IxDyn;

use crate::error::{Result, SaliencyError};
use crate::stream::StreamKey;
use crate::types::{scalar_tensor, Tensor};

/// Running statistics for every tracked stream plus the batch counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    /// Statistic tensors keyed by (name, statistic).
    streams: BTreeMap<StreamKey, Tensor>,

    /// Number of batches folded in so far (0 before the first batch).
    batch_index: usize,
}

impl Accumulator {
    /// Create an empty accumulator with batch index 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a zero-initialized stream of the given shape.
    pub fn with_zeros(mut self, key: StreamKey, shape: &[usize]) -> Self {
        self.streams.insert(key, Tensor::zeros(IxDyn(shape)));
        self
    }

    /// Builder: add a stream with an explicit initial value.
    pub fn with_value(mut self, key: StreamKey, value: Tensor) -> Self {
        self.streams.insert(key, value);
        self
    }

    /// Builder: seed a delta stream with `+inf` so the first check never
    /// reports convergence before any batch was drawn.
    pub fn with_unconverged_delta(self, key: StreamKey) -> Self {
        self.with_value(key, scalar_tensor(f32::INFINITY))
    }

    /// Insert or replace a stream, returning the previous value.
    pub fn insert(&mut self, key: StreamKey, value: Tensor) -> Option<Tensor> {
        self.streams.insert(key, value)
    }

    /// Look up a stream.
    pub fn get(&self, key: &StreamKey) -> Option<&Tensor> {
        self.streams.get(key)
    }

    /// Look up a stream that must exist.
    pub fn require(&self, key: &StreamKey) -> Result<&Tensor> {
        self.streams
            .get(key)
            .ok_or_else(|| SaliencyError::UnknownStream(key.clone()))
    }

    /// Read a rank-0 (or single element) stream as a scalar.
    pub fn scalar(&self, key: &StreamKey) -> Result<f32> {
        let tensor = self.require(key)?;
        if tensor.len() != 1 {
            return Err(SaliencyError::ShapeMismatch {
                stream: key.to_string(),
                expected: Vec::new(),
                found: tensor.shape().to_vec(),
            });
        }
        tensor
            .iter()
            .next()
            .copied()
            .ok_or_else(|| SaliencyError::UnknownStream(key.clone()))
    }

    /// Whether a stream is present.
    pub fn contains(&self, key: &StreamKey) -> bool {
        self.streams.contains_key(key)
    }

    /// Number of completed batches.
    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    /// Builder: set the batch counter (for resuming a run).
    pub fn with_batch_index(mut self, batch_index: usize) -> Self {
        self.batch_index = batch_index;
        self
    }

    /// Advance the batch counter by one and return the new snapshot.
    pub fn advance(mut self) -> Self {
        self.batch_index += 1;
        self
    }

    /// Iterate over stream keys in a stable order.
    pub fn keys(&self) -> btree_map::Keys<'_, StreamKey, Tensor> {
        self.streams.keys()
    }

    /// Iterate over (key, tensor) pairs in a stable order.
    pub fn iter(&self) -> btree_map::Iter<'_, StreamKey, Tensor> {
        self.streams.iter()
    }

    /// Keys the updater folds batches into.
    pub fn tracked_keys(&self) -> Vec<StreamKey> {
        self.streams
            .keys()
            .filter(|key| key.statistic.is_running_moment())
            .cloned()
            .collect()
    }

    /// Number of streams (the batch counter is not counted).
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether no stream is tracked.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Consume into the stream map, adding the batch counter under
    /// [`StreamKey::batch_index`].
    pub fn into_streams(self) -> BTreeMap<StreamKey, Tensor> {
        let mut streams = self.streams;
        streams.insert(
            StreamKey::batch_index(),
            scalar_tensor(self.batch_index as f32),
        );
        streams
    }
}
