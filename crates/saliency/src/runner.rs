//! Binding a method to an image and running it to convergence.

use saliency_core::adaptive::{init_loop, initial_stats};
use saliency_core::statistics::variance;
use saliency_core::{
    AbstractProcess, Accumulator, GatherOutcome, Key, SaliencyError, StopReason, StreamKey,
    StreamName, Tensor,
};

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::explainers::{scorer_param, SharedScorer, FORWARD};
use crate::methods::Method;

/// An explanation method bound to a scorer and a configuration.
#[derive(Clone)]
pub struct Explainer {
    config: Config,
    scorer: SharedScorer,
}

impl std::fmt::Debug for Explainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Explainer")
            .field("config", &self.config)
            .field("num_classes", &self.scorer.num_classes())
            .finish()
    }
}

impl Explainer {
    /// Validate `config` against `scorer`.
    pub fn new(config: Config, scorer: SharedScorer) -> Result<Self> {
        config.validate()?;
        if scorer.num_classes() != config.num_classes {
            return Err(ConfigError::Invalid(format!(
                "scorer has {} classes but config expects {}",
                scorer.num_classes(),
                config.num_classes
            ))
            .into());
        }
        Ok(Self { config, scorer })
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The configured method with every parameter bound for `image`/`label`.
    pub fn process(&self, image: &Tensor, label: usize) -> Result<AbstractProcess> {
        let config = &self.config;
        let mut process = config.method.abstract_process();
        process
            .bind(FORWARD, scorer_param(self.scorer.clone()))?
            .bind("num_classes", config.num_classes)?
            .bind("input_shape", config.input_shape.clone())?
            .bind("image", image.clone())?
            .bind("label", label)?;
        match config.method {
            Method::NoiseInterpolation => {
                process.bind("alpha", config.alpha)?;
            }
            Method::SmoothGrad => {
                process.bind("noise_level", config.noise_level)?;
            }
            Method::IntegratedGradients | Method::FisherInformation => {}
        }
        Ok(process)
    }

    /// Run the method on `image` until the monitored statistic settles.
    pub fn explain(&self, image: &Tensor, label: usize) -> Result<Explanation> {
        self.explain_observed(image, label, |_| {})
    }

    /// Like [`explain`](Self::explain), calling `observer` after every batch.
    pub fn explain_observed<F>(&self, image: &Tensor, label: usize, observer: F) -> Result<Explanation>
    where
        F: Fn(&Accumulator),
    {
        let config = &self.config;
        if image.shape() != config.input_shape.as_slice() {
            return Err(SaliencyError::ShapeMismatch {
                stream: "image".to_string(),
                expected: config.input_shape.clone(),
                found: image.shape().to_vec(),
            }
            .into());
        }
        if label >= config.num_classes {
            return Err(ConfigError::Invalid(format!(
                "label {label} out of range for {} classes",
                config.num_classes
            ))
            .into());
        }

        let span = tracing::info_span!(
            "explain",
            method = %config.method,
            image_index = config.image_index,
            label
        );
        let _guard = span.enter();

        let mut process = self.process(image, label)?;

        // Shapes come from one unbatched call; batch 0 is never sampled.
        let first = process.clone().concretize()?.call(&Key::new(config.seed))?;
        let stats = initial_stats(&first, &config.statistics, &config.monitored_delta());

        let outcome = init_loop(&config.gather_config(), &mut process, &stats)?
            .run_observed(stats, observer)?;

        Ok(Explanation {
            config: config.clone(),
            label,
            outcome,
        })
    }
}

/// Converged statistics of one explanation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    /// Configuration the run used.
    pub config: Config,
    /// Explained label.
    pub label: usize,
    /// Loop result.
    pub outcome: GatherOutcome,
}

impl Explanation {
    /// Final statistics.
    pub fn stats(&self) -> &Accumulator {
        &self.outcome.stats
    }

    /// Why sampling stopped.
    pub fn reason(&self) -> &StopReason {
        &self.outcome.reason
    }

    /// Batches drawn.
    pub fn batches(&self) -> usize {
        self.outcome.batches()
    }

    /// Samples drawn.
    pub fn samples(&self) -> usize {
        self.batches() * self.config.batch_size
    }

    /// Running mean of `name`, if tracked.
    pub fn mean(&self, name: &StreamName) -> Option<&Tensor> {
        self.outcome.stats.get(&StreamKey::mean(name.clone()))
    }

    /// Running second moment of `name`, if tracked.
    pub fn second_moment(&self, name: &StreamName) -> Option<&Tensor> {
        self.outcome.stats.get(&StreamKey::second_moment(name.clone()))
    }

    /// `E[x^2] - E[x]^2` of `name`.
    pub fn variance(&self, name: &StreamName) -> Result<Tensor> {
        Ok(variance(&self.outcome.stats, name)?)
    }

    /// The saliency map: the monitored statistic of the monitored stream.
    pub fn saliency(&self) -> Option<&Tensor> {
        self.outcome.stats.get(&self.config.monitored_source())
    }
}
