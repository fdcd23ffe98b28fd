//! # saliency
//!
//! Stochastic saliency explanations with convergence-gated sampling.
//!
//! An explanation method is a random process over an image: each random key
//! perturbs the input (noise interpolation, smooth-grad, a point on the
//! integrated-gradients path, a sampled label) and returns the gradient of
//! the scorer's output. [`Explainer`] binds a method to a scorer, an image
//! and a label, then hands it to the `saliency-core` loop, which draws
//! batches until the running second moment of the gradient stops moving.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use saliency::{Config, Explainer, LinearScorer, Method, OutputLayer};
//!
//! let config = Config::quick().method(Method::NoiseInterpolation).alpha(0.3);
//! let scorer = LinearScorer::random(&key, &config.input_shape, config.num_classes, OutputLayer::LogSoftmax)?;
//! let explanation = Explainer::new(config, Arc::new(scorer))?.explain(&image, label)?;
//!
//! println!("{}", saliency::output::format_explanation(&explanation));
//! ```
//!
//! ## Evaluation
//!
//! - [`consistency`]: cosine distance between repeated saliency maps
//! - [`masking`]: deletion / insertion accuracy at a removal percentage

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod config;
mod error;
mod runner;

// Functional modules
pub mod consistency;
pub mod explainers;
pub mod masking;
pub mod methods;
pub mod neighborhoods;
pub mod operations;
pub mod output;

// Re-exports for public API
pub use config::Config;
pub use consistency::ConsistencyMeasure;
pub use error::{ConfigError, Error, OutputError, Result, SaliencyError};
pub use explainers::{LinearScorer, OutputLayer, Scorer, SharedScorer};
pub use masking::{accuracy_at_q, AccuracyAtQ, QDirection};
pub use methods::Method;
pub use runner::{Explainer, Explanation};

pub use saliency_core::{Key, StopReason, Statistic, StreamKey, StreamName, Tensor};
