//! Error types for the streaming statistics core.

use thiserror::Error;

use crate::stream::{StreamKey, StreamName};

/// Result type alias using [`SaliencyError`].
pub type Result<T> = std::result::Result<T, SaliencyError>;

/// Errors raised while building or running a sampling loop.
///
/// Everything here is fatal for the run that produced it. Running out of
/// batches before convergence is *not* an error; it is reported through
/// [`StopReason::BudgetExhausted`](crate::adaptive::StopReason).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaliencyError {
    /// A required process parameter was never bound before concretization.
    #[error("process `{process}` is missing required parameter `{parameter}`")]
    MissingParameter {
        /// Process name.
        process: String,
        /// Parameter name.
        parameter: String,
    },

    /// A bound parameter has a different type than the process expects.
    #[error("parameter `{parameter}` has the wrong type: expected {expected}")]
    ParameterType {
        /// Parameter name.
        parameter: String,
        /// Expected parameter kind.
        expected: &'static str,
    },

    /// The random key is supplied per call and can never be bound.
    #[error("parameter `{0}` is reserved and cannot be bound")]
    ReservedParameter(String),

    /// `bind` was called after the process was concretized.
    #[error("process `{0}` is already concretized; no further parameters can be bound")]
    ProcessFrozen(String),

    /// A stream key referenced by the loop is absent from the accumulator.
    #[error("stream `{0}` is not present in the accumulator")]
    UnknownStream(StreamKey),

    /// A process did not produce an output the updater needs.
    #[error("sampled batch has no output named `{0}`")]
    MissingOutput(StreamName),

    /// Tensor shapes disagree; no implicit broadcasting is performed.
    #[error("shape mismatch in `{stream}`: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Stream (or operand) name.
        stream: String,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        found: Vec<usize>,
    },

    /// The stopping condition must monitor an absolute-delta stream.
    #[error("monitored key `{0}` is not an abs_delta stream")]
    MonitoredKeyNotDelta(StreamKey),

    /// Invalid loop or process configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The batch index is 1-based; zero would divide by zero.
    #[error("batch index must be >= 1")]
    InvalidBatchIndex,

    /// A statistic became NaN and convergence can no longer be judged.
    #[error("stream `{0}` produced a non-finite value")]
    NonFinite(StreamKey),

    /// The injected scoring function failed.
    #[error("scorer failed: {0}")]
    Scorer(String),
}
