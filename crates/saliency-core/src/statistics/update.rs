//! Running moment recurrence.
//!
//! With constant batch size and 1-based batch index `b`, each tracked
//! statistic follows
//!
//! ```text
//! new = (1/b) · batch_mean(x or x²) + ((b-1)/b) · old
//! ```
//!
//! which equals the pooled sample moment over all `b` batches. Only the
//! running moments are folded; `none` and `abs_delta` entries are carried
//! through untouched, except the monitored delta, which is overwritten with
//! `max |new_source - old_source|` after every update.

use ndarray::{Axis, Zip};

use crate::accumulator::Accumulator;
use crate::error::{Result, SaliencyError};
use crate::sampler::Batch;
use crate::stream::{Statistic, StreamKey};
use crate::types::{scalar_tensor, Tensor};

/// Which streams an update folds in, and which pair it monitors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    tracked: Vec<StreamKey>,
    source: StreamKey,
    delta: StreamKey,
}

impl UpdatePlan {
    /// Build a plan.
    ///
    /// # Errors
    ///
    /// - `MonitoredKeyNotDelta` if `delta` is not an `abs_delta` key
    /// - `InvalidConfig` if a tracked key is not a running moment, or the
    ///   monitored source is not among the tracked keys
    pub fn new(tracked: Vec<StreamKey>, source: StreamKey, delta: StreamKey) -> Result<Self> {
        if delta.statistic != Statistic::AbsDelta {
            return Err(SaliencyError::MonitoredKeyNotDelta(delta));
        }
        if let Some(key) = tracked.iter().find(|k| !k.statistic.is_running_moment()) {
            return Err(SaliencyError::InvalidConfig(format!(
                "tracked stream `{key}` is not a running moment"
            )));
        }
        if !tracked.contains(&source) {
            return Err(SaliencyError::InvalidConfig(format!(
                "monitored source `{source}` is not a tracked stream"
            )));
        }
        Ok(Self {
            tracked,
            source,
            delta,
        })
    }

    /// Plan tracking every running moment present in `stats`.
    pub fn from_accumulator(stats: &Accumulator, source: StreamKey, delta: StreamKey) -> Result<Self> {
        Self::new(stats.tracked_keys(), source, delta)
    }

    /// Check that `stats` holds every stream this plan reads or writes.
    pub fn validate(&self, stats: &Accumulator) -> Result<()> {
        for key in self.tracked.iter().chain(std::iter::once(&self.delta)) {
            stats.require(key)?;
        }
        Ok(())
    }

    /// Keys folded on every update.
    pub fn tracked(&self) -> &[StreamKey] {
        &self.tracked
    }

    /// The monitored source statistic.
    pub fn source(&self) -> &StreamKey {
        &self.source
    }

    /// The monitored absolute-delta key.
    pub fn delta(&self) -> &StreamKey {
        &self.delta
    }
}

/// Fold one sampled batch into the accumulator.
///
/// `batch_index` is 1-based: it is the number of batches folded in once this
/// call returns. All batches of a run must have the same size for the
/// result to equal the pooled moment.
///
/// # Errors
///
/// - `InvalidBatchIndex` for `batch_index == 0`
/// - `MissingOutput` if the batch lacks a tracked stream
/// - `ShapeMismatch` if a batch element's shape differs from the statistic's
/// - `NonFinite` if the resulting delta is NaN
pub fn update_stats(
    batch: &Batch,
    stats: Accumulator,
    batch_index: usize,
    plan: &UpdatePlan,
) -> Result<Accumulator> {
    if batch_index == 0 {
        return Err(SaliencyError::InvalidBatchIndex);
    }
    let b = batch_index as f32;
    let new_weight = 1.0 / b;
    let old_weight = (b - 1.0) / b;

    let mut stats = stats;
    let previous_source = stats.require(&plan.source)?.clone();

    for key in &plan.tracked {
        let samples = batch
            .get(&key.name)
            .ok_or_else(|| SaliencyError::MissingOutput(key.name.clone()))?;
        let old = stats.require(key)?;
        if samples.ndim() == 0 || &samples.shape()[1..] != old.shape() {
            return Err(SaliencyError::ShapeMismatch {
                stream: key.to_string(),
                expected: old.shape().to_vec(),
                found: samples.shape().get(1..).unwrap_or_default().to_vec(),
            });
        }

        let batch_moment = match key.statistic {
            Statistic::Mean => samples.mean_axis(Axis(0)),
            Statistic::SecondMoment => samples.mapv(|x| x * x).mean_axis(Axis(0)),
            Statistic::None | Statistic::AbsDelta => continue,
        }
        .ok_or_else(|| SaliencyError::InvalidConfig("batch has no lanes".to_string()))?;

        let updated = batch_moment * new_weight + old * old_weight;
        stats.insert(key.clone(), updated);
    }

    let delta = max_abs_diff(stats.require(&plan.source)?, &previous_source)?;
    if delta.is_nan() {
        return Err(SaliencyError::NonFinite(plan.delta.clone()));
    }
    tracing::trace!(batch_index, delta, source = %plan.source, "statistics updated");
    stats.insert(plan.delta.clone(), scalar_tensor(delta));
    Ok(stats)
}

/// Largest elementwise absolute difference; NaN if any difference is NaN.
///
/// # Errors
///
/// `ShapeMismatch` if the tensors differ in shape.
pub fn max_abs_diff(current: &Tensor, previous: &Tensor) -> Result<f32> {
    if current.shape() != previous.shape() {
        return Err(SaliencyError::ShapeMismatch {
            stream: "abs_delta".to_string(),
            expected: previous.shape().to_vec(),
            found: current.shape().to_vec(),
        });
    }
    Ok(Zip::from(current)
        .and(previous)
        .fold(0.0_f32, |acc, &x, &y| {
            let d = (x - y).abs();
            if d > acc || d.is_nan() {
                d
            } else {
                acc
            }
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Stream, StreamName};
    use ndarray::IxDyn;
    use proptest::prelude::*;

    fn grad() -> StreamName {
        StreamName::VANILLA_GRAD_MASK
    }

    fn plan() -> UpdatePlan {
        let source = StreamKey::second_moment(grad());
        UpdatePlan::new(
            vec![StreamKey::mean(grad()), source.clone()],
            source.clone(),
            source.delta(),
        )
        .unwrap()
    }

    fn stats(shape: &[usize]) -> Accumulator {
        Accumulator::new()
            .with_zeros(StreamKey::mean(grad()), shape)
            .with_zeros(StreamKey::second_moment(grad()), shape)
            .with_unconverged_delta(StreamKey::abs_delta(grad()))
    }

    fn constant_batch(value: f32, lanes: usize, shape: &[usize]) -> Batch {
        let mut full = vec![lanes];
        full.extend_from_slice(shape);
        let mut outputs = Stream::new();
        outputs.insert(grad(), Tensor::from_elem(IxDyn(&full), value));
        Batch::from_outputs(outputs).unwrap()
    }

    fn first(acc: &Accumulator, key: &StreamKey) -> f32 {
        acc.require(key).unwrap().iter().next().copied().unwrap()
    }

    // ========================================================================
    // Recurrence
    // ========================================================================

    #[test]
    fn test_two_batches_average() {
        let plan = plan();
        let acc = update_stats(&constant_batch(2.0, 4, &[2]), stats(&[2]), 1, &plan).unwrap();
        assert_eq!(first(&acc, &StreamKey::mean(grad())), 2.0);
        assert_eq!(first(&acc, &StreamKey::second_moment(grad())), 4.0);

        let acc = update_stats(&constant_batch(4.0, 4, &[2]), acc, 2, &plan).unwrap();
        assert_eq!(first(&acc, &StreamKey::mean(grad())), 3.0);
        assert_eq!(first(&acc, &StreamKey::second_moment(grad())), 10.0);
    }

    #[test]
    fn test_delta_tracks_source_change() {
        let plan = plan();
        let acc = update_stats(&constant_batch(2.0, 4, &[2]), stats(&[2]), 1, &plan).unwrap();
        // second moment moved from 0 to 4
        assert_eq!(acc.scalar(plan.delta()).unwrap(), 4.0);

        let acc = update_stats(&constant_batch(2.0, 4, &[2]), acc, 2, &plan).unwrap();
        assert_eq!(acc.scalar(plan.delta()).unwrap(), 0.0);
    }

    #[test]
    fn test_untracked_streams_untouched() {
        let plan = plan();
        let extra = StreamKey::new(StreamName::new("label"), Statistic::None);
        let acc = stats(&[2]).with_value(extra.clone(), scalar_tensor(7.0));
        let acc = update_stats(&constant_batch(1.0, 2, &[2]), acc, 1, &plan).unwrap();
        assert_eq!(acc.scalar(&extra).unwrap(), 7.0);
    }

    #[test]
    fn test_batch_counter_not_touched() {
        let acc = stats(&[1]).with_batch_index(4);
        let acc = update_stats(&constant_batch(1.0, 2, &[1]), acc, 5, &plan()).unwrap();
        assert_eq!(acc.batch_index(), 4);
    }

    // ========================================================================
    // Errors
    // ========================================================================

    #[test]
    fn test_zero_batch_index_rejected() {
        let err = update_stats(&constant_batch(1.0, 2, &[2]), stats(&[2]), 0, &plan()).unwrap_err();
        assert_eq!(err, SaliencyError::InvalidBatchIndex);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = update_stats(&constant_batch(1.0, 2, &[3]), stats(&[2]), 1, &plan()).unwrap_err();
        assert!(matches!(err, SaliencyError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_missing_output_rejected() {
        let mut outputs = Stream::new();
        outputs.insert(StreamName::new("other"), Tensor::zeros(IxDyn(&[2, 2])));
        let batch = Batch::from_outputs(outputs).unwrap();
        let err = update_stats(&batch, stats(&[2]), 1, &plan()).unwrap_err();
        assert_eq!(err, SaliencyError::MissingOutput(grad()));
    }

    #[test]
    fn test_nan_delta_rejected() {
        let err = update_stats(&constant_batch(f32::NAN, 2, &[2]), stats(&[2]), 1, &plan())
            .unwrap_err();
        assert!(matches!(err, SaliencyError::NonFinite(_)));
    }

    #[test]
    fn test_plan_requires_delta_key() {
        let source = StreamKey::mean(grad());
        let err = UpdatePlan::new(vec![source.clone()], source.clone(), source.clone()).unwrap_err();
        assert_eq!(err, SaliencyError::MonitoredKeyNotDelta(source));
    }

    #[test]
    fn test_plan_requires_tracked_source() {
        let source = StreamKey::mean(grad());
        let result = UpdatePlan::new(Vec::new(), source.clone(), source.delta());
        assert!(matches!(result, Err(SaliencyError::InvalidConfig(_))));
    }

    #[test]
    fn test_plan_validate_against_accumulator() {
        let plan = plan();
        assert!(plan.validate(&stats(&[2])).is_ok());
        assert!(plan.validate(&Accumulator::new()).is_err());
    }

    #[test]
    fn test_max_abs_diff() {
        let a = Tensor::from_shape_vec(IxDyn(&[3]), vec![1.0, -2.0, 0.5]).unwrap();
        let b = Tensor::from_shape_vec(IxDyn(&[3]), vec![0.0, 1.0, 0.5]).unwrap();
        assert_eq!(max_abs_diff(&a, &b).unwrap(), 3.0);
    }

    #[test]
    fn test_max_abs_diff_shape_mismatch() {
        let a = Tensor::zeros(IxDyn(&[2]));
        let b = Tensor::zeros(IxDyn(&[3]));
        let err = max_abs_diff(&a, &b).unwrap_err();
        assert_eq!(
            err,
            SaliencyError::ShapeMismatch {
                stream: "abs_delta".to_string(),
                expected: vec![3],
                found: vec![2],
            }
        );
    }

    // ========================================================================
    // Properties
    // ========================================================================

    proptest! {
        #[test]
        fn prop_running_mean_equals_pooled_mean(
            values in prop::collection::vec(-100.0f32..100.0, 2..40),
            lanes in 1usize..4,
        ) {
            let plan = plan();
            let mut acc = stats(&[1]);
            let mut pooled = 0.0f64;
            let mut pooled_sq = 0.0f64;
            for (i, &v) in values.iter().enumerate() {
                acc = update_stats(&constant_batch(v, lanes, &[1]), acc, i + 1, &plan).unwrap();
                pooled += f64::from(v);
                pooled_sq += f64::from(v) * f64::from(v);
            }
            let n = values.len() as f64;
            let mean = f64::from(first(&acc, &StreamKey::mean(grad())));
            let second = f64::from(first(&acc, &StreamKey::second_moment(grad())));
            prop_assert!((mean - pooled / n).abs() < 5e-2);
            prop_assert!((second - pooled_sq / n).abs() < 1.0 + 1e-3 * pooled_sq / n);
        }
    }
}
