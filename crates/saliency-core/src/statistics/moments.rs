//! Moments derived from the running mean and second moment.

use ndarray::Zip;

use crate::accumulator::Accumulator;
use crate::error::{Result, SaliencyError};
use crate::stream::{StreamKey, StreamName};
use crate::types::Tensor;

/// Elementwise `meanx2 - meanx²`, clamped at zero.
///
/// Requires both running moments of `name` in `stats`.
pub fn variance(stats: &Accumulator, name: &StreamName) -> Result<Tensor> {
    let mean_key = StreamKey::mean(name.clone());
    let mean = stats.require(&mean_key)?;
    let second = stats.require(&StreamKey::second_moment(name.clone()))?;
    if mean.shape() != second.shape() {
        return Err(SaliencyError::ShapeMismatch {
            stream: mean_key.to_string(),
            expected: second.shape().to_vec(),
            found: mean.shape().to_vec(),
        });
    }
    Ok(Zip::from(second)
        .and(mean)
        .map_collect(|&m2, &m| (m2 - m * m).max(0.0)))
}

/// Elementwise standard deviation, `sqrt(variance)`.
pub fn std_dev(stats: &Accumulator, name: &StreamName) -> Result<Tensor> {
    variance(stats, name).map(|v| v.mapv(f32::sqrt))
}
