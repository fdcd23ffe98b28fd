//! Deletion and insertion masks derived from a saliency map.
//!
//! For a removal percentage `remove_q`, the threshold is the
//! `100 - remove_q` percentile of the channel-summed saliency:
//!
//! - deletion keeps pixels strictly below it (the most salient are removed),
//! - insertion keeps pixels strictly above it (only the most salient stay).
//!
//! The masked image is re-scored and the prediction compared to the label.

use std::fmt;

use ndarray::{Axis, Zip};
use serde::{Deserialize, Serialize};

use saliency_core::{Result, SaliencyError, Tensor};

use crate::explainers::Scorer;
use crate::operations::multiply;

/// Which pixels a mask keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QDirection {
    /// Remove the most salient pixels.
    Deletion,
    /// Keep only the most salient pixels.
    Insertion,
}

impl fmt::Display for QDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QDirection::Deletion => write!(f, "deletion"),
            QDirection::Insertion => write!(f, "insertion"),
        }
    }
}

/// `q`-th percentile (0..=100) with linear interpolation between order
/// statistics.
pub fn percentile(values: impl IntoIterator<Item = f32>, q: f64) -> Result<f32> {
    if !(0.0..=100.0).contains(&q) {
        return Err(SaliencyError::InvalidConfig(format!(
            "percentile must be in [0, 100], got {q}"
        )));
    }
    let mut sorted: Vec<f32> = values.into_iter().collect();
    if sorted.is_empty() {
        return Err(SaliencyError::InvalidConfig(
            "percentile of an empty tensor".to_string(),
        ));
    }
    if sorted.iter().any(|x| x.is_nan()) {
        return Err(SaliencyError::InvalidConfig(
            "percentile of a tensor containing NaN".to_string(),
        ));
    }
    sorted.sort_by(f32::total_cmp);

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Mask `(…, 1)` keeping pixels according to `direction`.
///
/// The saliency is summed over its last (channel) axis first. With
/// `remove_q == 0` deletion keeps everything and insertion keeps nothing.
pub fn saliency_mask(saliency: &Tensor, remove_q: f64, direction: QDirection) -> Result<Tensor> {
    if saliency.ndim() == 0 {
        return Err(SaliencyError::InvalidConfig(
            "saliency must have a channel axis".to_string(),
        ));
    }
    let channel = Axis(saliency.ndim() - 1);
    let summed = saliency.sum_axis(channel).insert_axis(channel);

    if remove_q == 0.0 {
        let fill = match direction {
            QDirection::Deletion => 1.0,
            QDirection::Insertion => 0.0,
        };
        return Ok(Tensor::from_elem(summed.raw_dim(), fill));
    }

    let threshold = percentile(summed.iter().copied(), 100.0 - remove_q)?;
    Ok(summed.mapv(|s| {
        let keep = match direction {
            QDirection::Deletion => s < threshold,
            QDirection::Insertion => s > threshold,
        };
        if keep {
            1.0
        } else {
            0.0
        }
    }))
}

/// Score of a masked image at one removal percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyAtQ {
    /// Requested removal percentage.
    pub remove_q: f64,
    /// Mask direction.
    pub direction: QDirection,
    /// Class predicted on the masked image.
    pub predicted: usize,
    /// Whether `predicted` equals the label.
    pub correct: bool,
    /// Fraction of pixels the mask actually kept.
    pub actual_q: f32,
}

fn argmax(outputs: &Tensor) -> Result<usize> {
    outputs
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &x)| match best {
            Some((_, b)) if b >= x => best,
            _ => Some((i, x)),
        })
        .map(|(i, _)| i)
        .ok_or_else(|| SaliencyError::Scorer("scorer returned no outputs".to_string()))
}

/// Mask `image` by `saliency` at `remove_q` and re-score it.
pub fn accuracy_at_q(
    scorer: &dyn Scorer,
    image: &Tensor,
    saliency: &Tensor,
    label: usize,
    remove_q: f64,
    direction: QDirection,
) -> Result<AccuracyAtQ> {
    let mask = saliency_mask(saliency, remove_q, direction)?;
    let masked = multiply(image, &mask)?;
    let predicted = argmax(&scorer.forward(&masked)?)?;
    let actual_q = mask.mean().unwrap_or(0.0);
    tracing::trace!(remove_q, %direction, predicted, actual_q, "scored masked image");
    Ok(AccuracyAtQ {
        remove_q,
        direction,
        predicted,
        correct: predicted == label,
        actual_q,
    })
}

/// [`accuracy_at_q`] for every removal percentage in `qs`.
pub fn accuracy_curve(
    scorer: &dyn Scorer,
    image: &Tensor,
    saliency: &Tensor,
    label: usize,
    qs: &[f64],
    direction: QDirection,
) -> Result<Vec<AccuracyAtQ>> {
    qs.iter()
        .map(|&q| accuracy_at_q(scorer, image, saliency, label, q, direction))
        .collect()
}

/// Fraction of pixels where two masks agree.
pub fn mask_agreement(a: &Tensor, b: &Tensor) -> Result<f32> {
    if a.shape() != b.shape() {
        return Err(SaliencyError::ShapeMismatch {
            stream: "mask".to_string(),
            expected: a.shape().to_vec(),
            found: b.shape().to_vec(),
        });
    }
    let same = Zip::from(a)
        .and(b)
        .fold(0usize, |n, &x, &y| n + usize::from(x == y));
    Ok(same as f32 / a.len().max(1) as f32)
}
