//! Stochastic explanation methods.
//!
//! Every method is an abstract process over the same base parameters:
//!
//! | Parameter | Kind |
//! |-----------|------|
//! | `forward` | scorer (see [`scorer_param`](crate::explainers::scorer_param)) |
//! | `num_classes` | int |
//! | `input_shape` | shape, rank 4 (NHWC) |
//! | `image` | tensor of `input_shape` |
//! | `label` | int |
//!
//! and writes `vanilla_grad_mask`, `results_at_projection` and `log_probs`
//! for one random key.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, IxDyn};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use serde::{Deserialize, Serialize};

use saliency_core::{AbstractProcess, Params, Result, SaliencyError, Stream, StreamName, Tensor};

use crate::explainers::{bound_scorer, projection, vanilla_gradient, GradientOutputs, FORWARD};
use crate::neighborhoods::{normal_tensor, uniform_tensor};
use crate::operations::{
    broadcast_shape, convex_combination, linear_combination, multiply, resize_linear,
};

/// Base parameter names shared by every method.
pub const BASE_PARAMS: [&str; 5] = [FORWARD, "num_classes", "input_shape", "image", "label"];

/// Default smooth-grad noise level.
pub const DEFAULT_NOISE_LEVEL: f64 = 0.3;

/// An explanation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Gradient at a convex combination of the image and Gaussian noise.
    #[default]
    NoiseInterpolation,
    /// Gradient at the image plus scaled Gaussian noise.
    SmoothGrad,
    /// Path gradient from a baseline, scaled by `image - baseline`.
    IntegratedGradients,
    /// Score function of a label drawn from the model's own prediction.
    FisherInformation,
}

impl Method {
    /// All methods in declaration order.
    pub const ALL: [Method; 4] = [
        Method::NoiseInterpolation,
        Method::SmoothGrad,
        Method::IntegratedGradients,
        Method::FisherInformation,
    ];

    /// Stable name used in configs and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::NoiseInterpolation => "noise_interpolation",
            Method::SmoothGrad => "smooth_grad",
            Method::IntegratedGradients => "integrated_gradients",
            Method::FisherInformation => "fisher_information",
        }
    }

    /// A fresh, unbound abstract process for this method.
    pub fn abstract_process(&self) -> AbstractProcess {
        match self {
            Method::NoiseInterpolation => noise_interpolation(),
            Method::SmoothGrad => smooth_grad(),
            Method::IntegratedGradients => integrated_gradients(),
            Method::FisherInformation => fisher_information(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = SaliencyError;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SaliencyError::InvalidConfig(format!("unknown method `{s}`")))
    }
}

fn ones() -> Tensor {
    Tensor::ones(IxDyn(&[1, 1, 1, 1]))
}

fn filled(value: f32) -> Tensor {
    Tensor::from_elem(IxDyn(&[1, 1, 1, 1]), value)
}

/// Validated base parameters.
struct Inputs<'a> {
    input_shape: &'a [usize],
    image: &'a Tensor,
    num_classes: usize,
    label: usize,
}

fn inputs(params: &Params) -> Result<Inputs<'_>> {
    let input_shape = params.shape("input_shape")?;
    if input_shape.len() != 4 {
        return Err(SaliencyError::InvalidConfig(format!(
            "input_shape must have rank 4 (NHWC), got {input_shape:?}"
        )));
    }
    let image = params.tensor("image")?;
    if image.shape() != input_shape {
        return Err(SaliencyError::ShapeMismatch {
            stream: "image".to_string(),
            expected: input_shape.to_vec(),
            found: image.shape().to_vec(),
        });
    }
    Ok(Inputs {
        input_shape,
        image,
        num_classes: params.usize("num_classes")?,
        label: params.usize("label")?,
    })
}

fn write_outputs(stream: &mut Stream, outputs: GradientOutputs) {
    stream.insert(StreamName::VANILLA_GRAD_MASK, outputs.grad);
    stream.insert(StreamName::RESULTS_AT_PROJECTION, outputs.results_at_projection);
    stream.insert(StreamName::LOG_PROBS, outputs.log_probs);
}

/// Noise interpolation: `x = (1 - alpha) * image + alpha * N(0, 1)`.
///
/// Extra required parameter: `alpha`.
pub fn noise_interpolation() -> AbstractProcess {
    let mut required = BASE_PARAMS.to_vec();
    required.push("alpha");
    AbstractProcess::new("noise_interpolation", &required, |key, params, stream| {
        let inputs = inputs(params)?;
        let scorer = bound_scorer(params)?;
        let alpha_mask = filled(params.float("alpha")? as f32);
        let projection = projection(inputs.num_classes, inputs.label)?;

        let noise = normal_tensor(key, inputs.input_shape, 0.0, 1.0)?;
        let neighbor = convex_combination(inputs.image, &noise, &alpha_mask)?;
        write_outputs(stream, vanilla_gradient(&neighbor, &projection, scorer.as_ref())?);
        Ok(())
    })
}

/// Smooth-grad: `x = image + noise_level * N(0, 1)`.
///
/// Defaulted parameter: `noise_level = 0.3`.
pub fn smooth_grad() -> AbstractProcess {
    AbstractProcess::new("smooth_grad", &BASE_PARAMS, |key, params, stream| {
        let inputs = inputs(params)?;
        let scorer = bound_scorer(params)?;
        let noise_level = params.float("noise_level")?;
        if noise_level < 0.0 {
            return Err(SaliencyError::InvalidConfig(format!(
                "noise_level must be >= 0, got {noise_level}"
            )));
        }
        let projection = projection(inputs.num_classes, inputs.label)?;

        let noise = normal_tensor(key, inputs.input_shape, 0.0, 1.0)?;
        let neighbor =
            linear_combination(inputs.image, &ones(), &noise, &filled(noise_level as f32))?;
        write_outputs(stream, vanilla_gradient(&neighbor, &projection, scorer.as_ref())?);
        Ok(())
    })
    .with_default("noise_level", DEFAULT_NOISE_LEVEL)
}

/// Integrated gradients as an expectation over `alpha ~ U[0, 1)`:
/// the gradient at `baseline + alpha * (image - baseline)`, scaled by
/// `image - baseline`.
///
/// Defaulted parameter: `baseline` (zeros, shape `(1, 1, 1, 1)`). A baseline
/// that does not broadcast against the image is resized to `input_shape`.
pub fn integrated_gradients() -> AbstractProcess {
    AbstractProcess::new("integrated_gradients", &BASE_PARAMS, |key, params, stream| {
        let inputs = inputs(params)?;
        let scorer = bound_scorer(params)?;
        let projection = projection(inputs.num_classes, inputs.label)?;

        let bound = params.tensor("baseline")?;
        let resized;
        let baseline = match broadcast_shape(bound.shape(), inputs.input_shape) {
            Some(shape) if shape == inputs.input_shape => bound,
            _ => {
                resized = resize_linear(bound, inputs.input_shape)?;
                &resized
            }
        };

        let alpha = uniform_tensor(key, &[1, 1, 1, 1]);
        let neighbor = convex_combination(baseline, inputs.image, &alpha)?;
        let mut outputs = vanilla_gradient(&neighbor, &projection, scorer.as_ref())?;
        let path = linear_combination(inputs.image, &ones(), baseline, &filled(-1.0))?;
        outputs.grad = multiply(&outputs.grad, &path)?;
        write_outputs(stream, outputs);
        Ok(())
    })
    .with_default("baseline", Tensor::zeros(IxDyn(&[1, 1, 1, 1])))
}

/// Fisher information: a label is drawn from the model's predictive
/// distribution at the image and the gradient of its output is taken.
///
/// With a `log_softmax` scorer the running second moment of the gradient is
/// the diagonal of the empirical Fisher information. The bound `label` is
/// still validated but does not select the projection.
pub fn fisher_information() -> AbstractProcess {
    AbstractProcess::new("fisher_information", &BASE_PARAMS, |key, params, stream| {
        let inputs = inputs(params)?;
        let scorer = bound_scorer(params)?;
        projection(inputs.num_classes, inputs.label)?;

        let outputs = scorer.forward(inputs.image)?;
        let outputs: Array1<f32> = outputs.iter().copied().collect();
        let probs = scorer.output_layer().probabilities(&outputs);
        let categorical = WeightedIndex::new(probs.iter().map(|p| p.max(0.0)))
            .map_err(|e| SaliencyError::Scorer(format!("predictive distribution: {e}")))?;
        let sampled = categorical.sample(&mut key.rng());

        let projection = projection(inputs.num_classes, sampled)?;
        write_outputs(stream, vanilla_gradient(inputs.image, &projection, scorer.as_ref())?);
        Ok(())
    })
}
