//! Consistency of saliency maps across repeated runs.
//!
//! A group `(B, T, H, W, C)` holds `T` saliency maps for each of `B` images.
//! Maps are collapsed to one channel and downsampled by a fixed factor, then
//! the first map of every image is compared against the other `T - 1` maps
//! with cosine similarity. The reported distance is `1 - mean similarity`.

use ndarray::{Array1, ArrayView1, ArrayViewD, Axis};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use saliency_core::{Result, SaliencyError, Tensor};

use crate::operations::resize_linear;

/// Default spatial downsampling factor.
pub const DEFAULT_DOWNSAMPLING_FACTOR: usize = 10;

/// Cosine similarity, or `0.0` when either vector has zero norm.
pub fn cosine_similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norm == 0.0 {
        0.0
    } else {
        a.dot(&b) / norm
    }
}

/// Cosine-distance consistency of grouped saliency maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyMeasure {
    downsampling_factor: usize,
}

impl Default for ConsistencyMeasure {
    fn default() -> Self {
        Self {
            downsampling_factor: DEFAULT_DOWNSAMPLING_FACTOR,
        }
    }
}

impl ConsistencyMeasure {
    /// Measure with a custom spatial downsampling factor.
    pub fn new(downsampling_factor: usize) -> Self {
        assert!(
            downsampling_factor > 0,
            "downsampling_factor must be > 0 (got {})",
            downsampling_factor
        );
        Self { downsampling_factor }
    }

    /// Spatial downsampling factor.
    pub fn downsampling_factor(&self) -> usize {
        self.downsampling_factor
    }

    /// Shape `(T, H/f, W/f, 1)` each image's `(T, H, W, C)` maps are
    /// resized to.
    pub fn downsampled_shape(&self, maps: &[usize]) -> Result<Vec<usize>> {
        match *maps {
            [count, height, width, _] => {
                let f = self.downsampling_factor;
                Ok(vec![count, (height / f).max(1), (width / f).max(1), 1])
            }
            _ => Err(SaliencyError::InvalidConfig(format!(
                "saliency maps must be (T, H, W, C), got {:?}",
                maps
            ))),
        }
    }

    /// One distance per image of the `(B, T, H, W, C)` group.
    pub fn measure(&self, group: &Tensor) -> Result<Array1<f32>> {
        if group.ndim() != 5 {
            return Err(SaliencyError::InvalidConfig(format!(
                "consistency group must be (B, T, H, W, C), got {:?}",
                group.shape()
            )));
        }
        if group.shape()[1] < 2 {
            return Err(SaliencyError::InvalidConfig(format!(
                "consistency needs at least two maps per image, got {}",
                group.shape()[1]
            )));
        }

        #[cfg(feature = "parallel")]
        let distances: Result<Vec<f32>> = (0..group.shape()[0])
            .into_par_iter()
            .map(|b| self.distance(group.index_axis(Axis(0), b)))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let distances: Result<Vec<f32>> = group
            .axis_iter(Axis(0))
            .map(|maps| self.distance(maps))
            .collect();

        Ok(Array1::from(distances?))
    }

    fn distance(&self, maps: ArrayViewD<'_, f32>) -> Result<f32> {
        let target = self.downsampled_shape(maps.shape())?;
        let resized = resize_linear(&maps.to_owned(), &target)?;
        let count = target[0];
        let rows = resized
            .into_shape_with_order((count, target[1] * target[2]))
            .map_err(|e| SaliencyError::InvalidConfig(e.to_string()))?;

        let reference = rows.row(0);
        let total: f32 = (1..count)
            .map(|t| cosine_similarity(reference, rows.row(t)))
            .sum();
        Ok(1.0 - total / (count - 1) as f32)
    }
}
