//! Scoring-function seam and the vanilla gradient explainer.
//!
//! The classifier is never implemented here: it is injected as a [`Scorer`]
//! that can evaluate the output layer and pull a cotangent back to the
//! input. [`LinearScorer`] is a small analytic model for demos and tests.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array1, Array2, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use saliency_core::{Key, Param, Params, Result, SaliencyError, Tensor};

use crate::neighborhoods::normal_tensor;

/// Parameter name under which processes look up the scorer.
pub const FORWARD: &str = "forward";

/// Which transform of the logits the scorer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayer {
    /// Raw logits.
    Logits,
    /// Log-probabilities.
    #[default]
    LogSoftmax,
    /// Probabilities.
    Softmax,
}

impl OutputLayer {
    /// Stable name used in configs and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputLayer::Logits => "logits",
            OutputLayer::LogSoftmax => "log_softmax",
            OutputLayer::Softmax => "softmax",
        }
    }

    /// Apply the layer to a logits vector.
    pub fn apply(&self, logits: &Array1<f32>) -> Array1<f32> {
        match self {
            OutputLayer::Logits => logits.clone(),
            OutputLayer::LogSoftmax => {
                let lse = log_sum_exp(logits);
                logits.mapv(|z| z - lse)
            }
            OutputLayer::Softmax => softmax(logits),
        }
    }

    /// Predictive probabilities recovered from this layer's outputs.
    pub fn probabilities(&self, outputs: &Array1<f32>) -> Array1<f32> {
        match self {
            OutputLayer::Logits => softmax(outputs),
            OutputLayer::LogSoftmax => outputs.mapv(f32::exp),
            OutputLayer::Softmax => outputs.clone(),
        }
    }

    /// Pull a cotangent on the layer's outputs back to the logits.
    fn pullback(&self, logits: &Array1<f32>, cotangent: &Array1<f32>) -> Array1<f32> {
        match self {
            OutputLayer::Logits => cotangent.clone(),
            OutputLayer::LogSoftmax => {
                let p = softmax(logits);
                let total = cotangent.sum();
                cotangent - &(p * total)
            }
            OutputLayer::Softmax => {
                let p = softmax(logits);
                let inner = cotangent.dot(&p);
                &p * &cotangent.mapv(|c| c - inner)
            }
        }
    }
}

impl fmt::Display for OutputLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputLayer {
    type Err = SaliencyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "logits" => Ok(OutputLayer::Logits),
            "log_softmax" => Ok(OutputLayer::LogSoftmax),
            "softmax" => Ok(OutputLayer::Softmax),
            other => Err(SaliencyError::InvalidConfig(format!(
                "unknown output layer `{other}` (expected logits, log_softmax or softmax)"
            ))),
        }
    }
}

fn log_sum_exp(z: &Array1<f32>) -> f32 {
    let max = z.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
    if !max.is_finite() {
        return max;
    }
    max + z.mapv(|x| (x - max).exp()).sum().ln()
}

fn softmax(z: &Array1<f32>) -> Array1<f32> {
    let lse = log_sum_exp(z);
    z.mapv(|x| (x - lse).exp())
}

/// An injected classifier.
pub trait Scorer: Send + Sync {
    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// The transform applied to the logits by [`forward`](Self::forward).
    fn output_layer(&self) -> OutputLayer {
        OutputLayer::Logits
    }

    /// Output-layer values for one NHWC image, shape `(1, num_classes)`.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Gradient of `cotangent · forward(input)` with respect to `input`.
    ///
    /// `cotangent` has shape `(1, num_classes)`; the result has the shape of
    /// `input`.
    fn vjp(&self, input: &Tensor, cotangent: &Tensor) -> Result<Tensor>;
}

/// Shared handle to a scorer.
pub type SharedScorer = Arc<dyn Scorer>;

/// Wrap a scorer for binding under [`FORWARD`].
pub fn scorer_param(scorer: SharedScorer) -> Param {
    Param::opaque(scorer)
}

/// Recover the scorer bound under [`FORWARD`].
pub fn bound_scorer(params: &Params) -> Result<SharedScorer> {
    params
        .opaque::<SharedScorer>(FORWARD)
        .map(|scorer| scorer.as_ref().clone())
}

/// One-hot column `(num_classes, 1)` selecting `label`.
pub fn projection(num_classes: usize, label: usize) -> Result<Tensor> {
    if label >= num_classes {
        return Err(SaliencyError::InvalidConfig(format!(
            "label {label} out of range for {num_classes} classes"
        )));
    }
    let mut p = Tensor::zeros(IxDyn(&[num_classes, 1]));
    p[[label, 0]] = 1.0;
    Ok(p)
}

/// Outputs of the vanilla gradient explainer.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientOutputs {
    /// Gradient of the projected output with respect to the input.
    pub grad: Tensor,
    /// Projected output, shape `(1, 1)`.
    pub results_at_projection: Tensor,
    /// Full output layer, shape `(1, num_classes)`.
    pub log_probs: Tensor,
}

/// Gradient of `forward(source) · projection` with respect to `source`.
pub fn vanilla_gradient(
    source: &Tensor,
    projection: &Tensor,
    scorer: &dyn Scorer,
) -> Result<GradientOutputs> {
    let outputs = scorer.forward(source)?;
    let classes = scorer.num_classes();
    let out2 = outputs
        .view()
        .into_shape_with_order((1, classes))
        .map_err(|_| SaliencyError::ShapeMismatch {
            stream: "forward".to_string(),
            expected: vec![1, classes],
            found: outputs.shape().to_vec(),
        })?;
    let proj2 = projection
        .view()
        .into_shape_with_order((classes, 1))
        .map_err(|_| SaliencyError::ShapeMismatch {
            stream: "projection".to_string(),
            expected: vec![classes, 1],
            found: projection.shape().to_vec(),
        })?;

    let results_at_projection = out2.dot(&proj2).into_dyn();
    let cotangent = proj2.t().to_owned().into_dyn();
    let grad = scorer.vjp(source, &cotangent)?;

    Ok(GradientOutputs {
        grad,
        results_at_projection,
        log_probs: outputs,
    })
}

/// Softmax-linear classifier `layer(W · flatten(x) + b)` with an analytic
/// gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearScorer {
    weights: Array2<f32>,
    bias: Array1<f32>,
    output_layer: OutputLayer,
}

impl LinearScorer {
    /// Build from weights `(num_classes, features)` and bias `(num_classes,)`.
    pub fn new(weights: Array2<f32>, bias: Array1<f32>, output_layer: OutputLayer) -> Result<Self> {
        if weights.nrows() != bias.len() || weights.nrows() == 0 {
            return Err(SaliencyError::ShapeMismatch {
                stream: "bias".to_string(),
                expected: vec![weights.nrows()],
                found: vec![bias.len()],
            });
        }
        Ok(Self {
            weights,
            bias,
            output_layer,
        })
    }

    /// Random Gaussian weights scaled by `1/sqrt(features)`, zero bias.
    pub fn random(
        key: &Key,
        input_shape: &[usize],
        num_classes: usize,
        output_layer: OutputLayer,
    ) -> Result<Self> {
        let features: usize = input_shape.iter().product();
        let std = 1.0 / (features.max(1) as f32).sqrt();
        let weights = normal_tensor(key, &[num_classes, features], 0.0, std)?
            .into_dimensionality()
            .map_err(|_| SaliencyError::InvalidConfig("weight shape".to_string()))?;
        Self::new(weights, Array1::zeros(num_classes), output_layer)
    }

    /// Number of input features.
    pub fn features(&self) -> usize {
        self.weights.ncols()
    }

    fn logits(&self, input: &Tensor) -> Result<Array1<f32>> {
        if input.len() != self.features() {
            return Err(SaliencyError::Scorer(format!(
                "expected {} input features, got {} (shape {:?})",
                self.features(),
                input.len(),
                input.shape()
            )));
        }
        let x: Array1<f32> = input.iter().copied().collect();
        Ok(self.weights.dot(&x) + &self.bias)
    }
}

impl Scorer for LinearScorer {
    fn num_classes(&self) -> usize {
        self.weights.nrows()
    }

    fn output_layer(&self) -> OutputLayer {
        self.output_layer
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let outputs = self.output_layer.apply(&self.logits(input)?);
        Ok(outputs.insert_axis(Axis(0)).into_dyn())
    }

    fn vjp(&self, input: &Tensor, cotangent: &Tensor) -> Result<Tensor> {
        if cotangent.len() != self.num_classes() {
            return Err(SaliencyError::ShapeMismatch {
                stream: "cotangent".to_string(),
                expected: vec![1, self.num_classes()],
                found: cotangent.shape().to_vec(),
            });
        }
        let logits = self.logits(input)?;
        let c: Array1<f32> = cotangent.iter().copied().collect();
        let g = self.output_layer.pullback(&logits, &c);
        let grad = self.weights.t().dot(&g);
        grad.into_shape_with_order(IxDyn(input.shape()))
            .map_err(|e| SaliencyError::Scorer(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn scorer(layer: OutputLayer) -> LinearScorer {
        LinearScorer::new(
            array![[1.0, 0.0, -1.0, 0.5], [0.0, 2.0, 1.0, 0.0], [-1.0, 1.0, 0.0, 1.0]],
            array![0.1, 0.0, -0.2],
            layer,
        )
        .unwrap()
    }

    fn image() -> Tensor {
        Tensor::from_shape_vec(IxDyn(&[1, 2, 2, 1]), vec![0.3, -0.7, 1.1, 0.2]).unwrap()
    }

    /// Central finite difference of `cotangent · forward` along each input.
    fn numeric_vjp(scorer: &LinearScorer, input: &Tensor, cotangent: &Tensor) -> Vec<f32> {
        let h = 1e-3;
        let score = |x: &Tensor| -> f32 {
            let out = scorer.forward(x).unwrap();
            out.iter().zip(cotangent.iter()).map(|(o, c)| o * c).sum()
        };
        (0..input.len())
            .map(|i| {
                let mut plus = input.clone();
                let mut minus = input.clone();
                plus.as_slice_mut().unwrap()[i] += h;
                minus.as_slice_mut().unwrap()[i] -= h;
                (score(&plus) - score(&minus)) / (2.0 * h)
            })
            .collect()
    }

    #[test]
    fn test_log_softmax_normalized() {
        let out = scorer(OutputLayer::LogSoftmax).forward(&image()).unwrap();
        assert_eq!(out.shape(), &[1, 3]);
        let total: f32 = out.iter().map(|x| x.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_vjp_matches_finite_differences() {
        let cotangent = Tensor::from_shape_vec(IxDyn(&[1, 3]), vec![0.0, 1.0, 0.0]).unwrap();
        for layer in [OutputLayer::Logits, OutputLayer::LogSoftmax, OutputLayer::Softmax] {
            let s = scorer(layer);
            let analytic = s.vjp(&image(), &cotangent).unwrap();
            let numeric = numeric_vjp(&s, &image(), &cotangent);
            for (a, n) in analytic.iter().zip(&numeric) {
                assert!((a - n).abs() < 1e-2, "{layer}: {a} vs {n}");
            }
        }
    }

    #[test]
    fn test_vanilla_gradient_outputs() {
        let s = scorer(OutputLayer::LogSoftmax);
        let p = projection(3, 1).unwrap();
        let out = vanilla_gradient(&image(), &p, &s).unwrap();
        assert_eq!(out.grad.shape(), &[1, 2, 2, 1]);
        assert_eq!(out.results_at_projection.shape(), &[1, 1]);
        assert_eq!(out.results_at_projection[[0, 0]], out.log_probs[[0, 1]]);
    }

    #[test]
    fn test_projection_out_of_range() {
        assert!(projection(3, 3).is_err());
        assert_eq!(projection(3, 2).unwrap()[[2, 0]], 1.0);
    }

    #[test]
    fn test_wrong_input_size_is_scorer_error() {
        let bad = Tensor::zeros(IxDyn(&[1, 3, 3, 1]));
        assert!(matches!(
            scorer(OutputLayer::Logits).forward(&bad),
            Err(SaliencyError::Scorer(_))
        ));
    }

    #[test]
    fn test_scorer_param_round_trip() {
        let shared: SharedScorer = Arc::new(scorer(OutputLayer::Logits));
        let mut params = Params::new();
        params.set(FORWARD, scorer_param(Arc::clone(&shared)));
        assert_eq!(bound_scorer(&params).unwrap().num_classes(), 3);
    }

    #[test]
    fn test_output_layer_parse() {
        assert_eq!("log_softmax".parse::<OutputLayer>().unwrap(), OutputLayer::LogSoftmax);
        assert!("relu".parse::<OutputLayer>().is_err());
    }
}
