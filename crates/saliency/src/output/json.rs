//! JSON summary of an explanation run.

use serde::Serialize;

use saliency_core::StopReason;

use crate::config::Config;
use crate::runner::Explanation;

/// Run metadata without the tensors.
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationSummary<'a> {
    /// Configuration the run used.
    pub config: &'a Config,
    /// Explained label.
    pub label: usize,
    /// Stop reason with batches and final delta.
    pub stop: &'a StopReason,
    /// Samples drawn.
    pub samples: usize,
    /// Keys present in the final statistics.
    pub streams: Vec<String>,
}

impl<'a> From<&'a Explanation> for ExplanationSummary<'a> {
    fn from(explanation: &'a Explanation) -> Self {
        Self {
            config: &explanation.config,
            label: explanation.label,
            stop: explanation.reason(),
            samples: explanation.samples(),
            streams: explanation.stats().keys().map(|k| k.to_string()).collect(),
        }
    }
}

/// Serialize the run summary to compact JSON.
pub fn to_json(explanation: &Explanation) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ExplanationSummary::from(explanation))
}

/// Serialize the run summary to pretty-printed JSON.
pub fn to_json_pretty(explanation: &Explanation) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ExplanationSummary::from(explanation))
}
