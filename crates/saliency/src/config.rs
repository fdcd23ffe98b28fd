//! Configuration of an explanation run.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use saliency_core::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_BATCHES, DEFAULT_MIN_CHANGE, DEFAULT_SEED,
};
use saliency_core::{GatherConfig, Statistic, StreamKey, StreamName};

use crate::error::ConfigError;
use crate::explainers::OutputLayer;
use crate::methods::{Method, DEFAULT_NOISE_LEVEL};

/// Configuration options for an [`Explainer`](crate::Explainer).
///
/// Every field has a default, so a JSON file only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Sampling loop
    // =========================================================================
    /// Base seed. Batch `b` is drawn from `seed + b`. Default: 42.
    pub seed: u64,

    /// Random keys per batch. Default: 32.
    pub batch_size: usize,

    /// Batch budget. Default: 312 (about 10,000 samples at the default
    /// batch size).
    pub max_batches: usize,

    /// Stop once the monitored statistic moves less than this between
    /// batches. Default: 0.01.
    pub min_change: f32,

    // =========================================================================
    // Tracked statistics
    // =========================================================================
    /// Stream whose statistic is monitored. Default: `vanilla_grad_mask`.
    pub monitored_stream: StreamName,

    /// Monitored statistic; must be one of `statistics`. Default: `meanx2`.
    pub monitored_statistic: Statistic,

    /// Running moments kept for every output. Default: `meanx`, `meanx2`.
    pub statistics: Vec<Statistic>,

    // =========================================================================
    // Model and input
    // =========================================================================
    /// Image shape, NHWC. Default: `[1, 224, 224, 3]`.
    pub input_shape: Vec<usize>,

    /// Number of classes of the scorer. Default: 1000.
    pub num_classes: usize,

    /// Output layer the scorer reports. Default: `log_softmax`.
    pub output_layer: OutputLayer,

    // =========================================================================
    // Method
    // =========================================================================
    /// Explanation method. Default: `noise_interpolation`.
    pub method: Method,

    /// Noise-interpolation weight of the noise. Default: 0.5.
    pub alpha: f64,

    /// Smooth-grad noise scale. Default: 0.3.
    pub noise_level: f64,

    /// Dataset index of the explained image, carried into records.
    pub image_index: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            batch_size: DEFAULT_BATCH_SIZE,
            max_batches: DEFAULT_MAX_BATCHES,
            min_change: DEFAULT_MIN_CHANGE,

            monitored_stream: StreamName::VANILLA_GRAD_MASK,
            monitored_statistic: Statistic::SecondMoment,
            statistics: vec![Statistic::Mean, Statistic::SecondMoment],

            input_shape: vec![1, 224, 224, 3],
            num_classes: 1000,
            output_layer: OutputLayer::LogSoftmax,

            method: Method::NoiseInterpolation,
            alpha: 0.5,
            noise_level: DEFAULT_NOISE_LEVEL,
            image_index: 0,
        }
    }
}

impl Config {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Small images and batches for demos and tests:
    /// `[1, 32, 32, 3]` input, 10 classes, batches of 8, at most 50 batches.
    pub fn quick() -> Self {
        Self {
            batch_size: 8,
            max_batches: 50,
            input_shape: vec![1, 32, 32, 3],
            num_classes: 10,
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // =========================================================================
    // Builder methods
    // =========================================================================

    /// Set the base seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        assert!(size > 0, "batch_size must be > 0 (got {})", size);
        self.batch_size = size;
        self
    }

    /// Set the batch budget.
    pub fn max_batches(mut self, max: usize) -> Self {
        assert!(max > 0, "max_batches must be > 0 (got {})", max);
        self.max_batches = max;
        self
    }

    /// Set the convergence threshold.
    pub fn min_change(mut self, min_change: f32) -> Self {
        assert!(min_change > 0.0, "min_change must be > 0 (got {})", min_change);
        self.min_change = min_change;
        self
    }

    /// Monitor `statistic` of `stream`.
    pub fn monitor(mut self, stream: StreamName, statistic: Statistic) -> Self {
        assert!(
            statistic.is_running_moment(),
            "monitored statistic must be meanx or meanx2 (got {})",
            statistic
        );
        self.monitored_stream = stream;
        self.monitored_statistic = statistic;
        self
    }

    /// Set the image shape.
    pub fn input_shape(mut self, shape: Vec<usize>) -> Self {
        assert!(shape.len() == 4, "input_shape must have rank 4 (got {:?})", shape);
        assert!(!shape.contains(&0), "input_shape must be non-empty (got {:?})", shape);
        self.input_shape = shape;
        self
    }

    /// Set the number of classes.
    pub fn num_classes(mut self, n: usize) -> Self {
        assert!(n > 0, "num_classes must be > 0 (got {})", n);
        self.num_classes = n;
        self
    }

    /// Set the output layer.
    pub fn output_layer(mut self, layer: OutputLayer) -> Self {
        self.output_layer = layer;
        self
    }

    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the noise-interpolation alpha.
    pub fn alpha(mut self, alpha: f64) -> Self {
        assert!((0.0..=1.0).contains(&alpha), "alpha must be in [0, 1] (got {})", alpha);
        self.alpha = alpha;
        self
    }

    /// Set the smooth-grad noise level.
    pub fn noise_level(mut self, level: f64) -> Self {
        assert!(level >= 0.0, "noise_level must be >= 0 (got {})", level);
        self.noise_level = level;
        self
    }

    /// Set the image index carried into records.
    pub fn image_index(mut self, index: usize) -> Self {
        self.image_index = index;
        self
    }

    // =========================================================================
    // Validation and conversion
    // =========================================================================

    /// Check every field, for configs that did not go through the builders.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.batch_size == 0 {
            return invalid("batch_size must be > 0".to_string());
        }
        if self.max_batches == 0 {
            return invalid("max_batches must be > 0".to_string());
        }
        if self.min_change.is_nan() || self.min_change <= 0.0 {
            return invalid(format!("min_change must be > 0, got {}", self.min_change));
        }
        if self.input_shape.len() != 4 || self.input_shape.contains(&0) {
            return invalid(format!(
                "input_shape must be a non-empty rank 4 shape, got {:?}",
                self.input_shape
            ));
        }
        if self.num_classes == 0 {
            return invalid("num_classes must be > 0".to_string());
        }
        if !self.monitored_statistic.is_running_moment() {
            return invalid(format!(
                "monitored_statistic must be meanx or meanx2, got {}",
                self.monitored_statistic
            ));
        }
        if !self.statistics.contains(&self.monitored_statistic) {
            return invalid(format!(
                "monitored_statistic {} is not among the tracked statistics",
                self.monitored_statistic
            ));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return invalid(format!("alpha must be in [0, 1], got {}", self.alpha));
        }
        if self.noise_level.is_nan() || self.noise_level < 0.0 {
            return invalid(format!("noise_level must be >= 0, got {}", self.noise_level));
        }
        Ok(())
    }

    /// One config per value of `alphas`, each otherwise equal to `self`.
    ///
    /// Only noise interpolation reads `alpha`; other methods accept a single
    /// value so runs are never repeated under different labels.
    pub fn alpha_sweep(&self, alphas: &[f64]) -> Result<Vec<Config>, ConfigError> {
        if alphas.is_empty() {
            return Err(ConfigError::Invalid("alpha sweep is empty".to_string()));
        }
        if alphas.len() > 1 && self.method != Method::NoiseInterpolation {
            return Err(ConfigError::Invalid(format!(
                "{} does not use alpha, got {} values to sweep",
                self.method,
                alphas.len()
            )));
        }
        alphas
            .iter()
            .map(|&alpha| {
                let config = Config {
                    alpha,
                    ..self.clone()
                };
                config.validate()?;
                Ok(config)
            })
            .collect()
    }

    /// Key of the monitored running statistic.
    pub fn monitored_source(&self) -> StreamKey {
        StreamKey::new(self.monitored_stream.clone(), self.monitored_statistic)
    }

    /// Key receiving the monitored change.
    pub fn monitored_delta(&self) -> StreamKey {
        self.monitored_source().delta()
    }

    /// Loop configuration for the core driver.
    pub fn gather_config(&self) -> GatherConfig {
        GatherConfig {
            seed: self.seed,
            batch_size: self.batch_size,
            max_batches: self.max_batches,
            min_change: self.min_change,
            monitored_source: self.monitored_source(),
            monitored_delta: self.monitored_delta(),
        }
    }
}
