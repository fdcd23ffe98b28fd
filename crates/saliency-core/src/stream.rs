//! Stream names, statistic kinds and stream keys.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SaliencyError;
use crate::types::Tensor;

/// Named tensors produced by one process call (or one stacked batch).
pub type Stream = BTreeMap<StreamName, Tensor>;

/// Name of a tracked quantity, e.g. `vanilla_grad_mask`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamName(Cow<'static, str>);

impl StreamName {
    /// Counter of completed batches.
    pub const BATCH_INDEX: StreamName = StreamName::from_static("batch_index");
    /// Gradient of the projected output with respect to the input.
    pub const VANILLA_GRAD_MASK: StreamName = StreamName::from_static("vanilla_grad_mask");
    /// Output layer values projected onto the target class.
    pub const RESULTS_AT_PROJECTION: StreamName =
        StreamName::from_static("results_at_projection");
    /// Output layer values for every class.
    pub const LOG_PROBS: StreamName = StreamName::from_static("log_probs");

    /// Name backed by a static string.
    pub const fn from_static(name: &'static str) -> Self {
        StreamName(Cow::Borrowed(name))
    }

    /// Name backed by an owned string.
    pub fn new(name: impl Into<String>) -> Self {
        StreamName(Cow::Owned(name.into()))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamName {
    fn from(name: &str) -> Self {
        StreamName::new(name)
    }
}

impl From<String> for StreamName {
    fn from(name: String) -> Self {
        StreamName::new(name)
    }
}

/// Kind of running statistic kept for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Statistic {
    /// Raw value, not updated by the loop (e.g. the batch counter).
    #[serde(rename = "none")]
    None,
    /// Running mean E[x].
    #[serde(rename = "meanx")]
    Mean,
    /// Running second moment E[x²].
    #[serde(rename = "meanx2")]
    SecondMoment,
    /// Max absolute change of a monitored statistic between two batches.
    #[serde(rename = "abs_delta")]
    AbsDelta,
}

impl Statistic {
    /// Whether the updater folds new batches into this kind.
    pub fn is_running_moment(&self) -> bool {
        match self {
            Statistic::Mean | Statistic::SecondMoment => true,
            Statistic::None | Statistic::AbsDelta => false,
        }
    }

    /// Identifier used in exported records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::None => "none",
            Statistic::Mean => "meanx",
            Statistic::SecondMoment => "meanx2",
            Statistic::AbsDelta => "abs_delta",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = SaliencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Statistic::None),
            "meanx" | "mean" => Ok(Statistic::Mean),
            "meanx2" | "second_moment" => Ok(Statistic::SecondMoment),
            "abs_delta" => Ok(Statistic::AbsDelta),
            other => Err(SaliencyError::InvalidConfig(format!(
                "unknown statistic `{other}`"
            ))),
        }
    }
}

/// Identifies one tensor in the accumulator: (name, statistic kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    /// Stream name.
    pub name: StreamName,
    /// Statistic kind.
    pub statistic: Statistic,
}

impl StreamKey {
    /// Create a key.
    pub fn new(name: StreamName, statistic: Statistic) -> Self {
        Self { name, statistic }
    }

    /// Running-mean key for `name`.
    pub fn mean(name: StreamName) -> Self {
        Self::new(name, Statistic::Mean)
    }

    /// Running-second-moment key for `name`.
    pub fn second_moment(name: StreamName) -> Self {
        Self::new(name, Statistic::SecondMoment)
    }

    /// Absolute-delta key for `name`.
    pub fn abs_delta(name: StreamName) -> Self {
        Self::new(name, Statistic::AbsDelta)
    }

    /// Key under which the batch counter is exported.
    pub fn batch_index() -> Self {
        Self::new(StreamName::BATCH_INDEX, Statistic::None)
    }

    /// The absolute-delta key monitoring this stream.
    pub fn delta(&self) -> Self {
        Self::abs_delta(self.name.clone())
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.statistic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_static_and_owned_names_are_equal() {
        assert_eq!(
            StreamName::VANILLA_GRAD_MASK,
            StreamName::new("vanilla_grad_mask")
        );
        let mut set = HashSet::new();
        set.insert(StreamKey::mean(StreamName::LOG_PROBS));
        assert!(set.contains(&StreamKey::mean(StreamName::from("log_probs"))));
    }

    #[test]
    fn test_statistic_roundtrip_str() {
        for stat in [
            Statistic::None,
            Statistic::Mean,
            Statistic::SecondMoment,
            Statistic::AbsDelta,
        ] {
            assert_eq!(stat.as_str().parse::<Statistic>().unwrap(), stat);
        }
        assert!("median".parse::<Statistic>().is_err());
    }

    #[test]
    fn test_key_display_and_delta() {
        let key = StreamKey::second_moment(StreamName::VANILLA_GRAD_MASK);
        assert_eq!(key.to_string(), "vanilla_grad_mask/meanx2");
        assert_eq!(key.delta().statistic, Statistic::AbsDelta);
        assert_eq!(key.delta().name, key.name);
    }

    #[test]
    fn test_running_moment_kinds() {
        assert!(Statistic::Mean.is_running_moment());
        assert!(Statistic::SecondMoment.is_running_moment());
        assert!(!Statistic::None.is_running_moment());
        assert!(!Statistic::AbsDelta.is_running_moment());
    }
}
