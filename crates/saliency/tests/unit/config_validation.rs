//! Tests for configuration validation.
//!
//! Builder setters panic on out-of-range values; `validate` reports the same
//! problems as errors for deserialized configurations.

use saliency::{Config, ConfigError, Method, OutputLayer, Statistic, StreamName};

// =============================================================================
// BUILDER VALIDATION
// =============================================================================

#[test]
#[should_panic(expected = "batch_size must be > 0")]
fn batch_size_zero_panics() {
    let _ = Config::new().batch_size(0);
}

#[test]
#[should_panic(expected = "max_batches must be > 0")]
fn max_batches_zero_panics() {
    let _ = Config::new().max_batches(0);
}

#[test]
#[should_panic(expected = "min_change must be > 0")]
fn min_change_zero_panics() {
    let _ = Config::new().min_change(0.0);
}

#[test]
#[should_panic(expected = "min_change must be > 0")]
fn min_change_nan_panics() {
    let _ = Config::new().min_change(f32::NAN);
}

#[test]
#[should_panic(expected = "alpha must be in [0, 1]")]
fn alpha_above_one_panics() {
    let _ = Config::new().alpha(1.5);
}

#[test]
#[should_panic(expected = "input_shape must have rank 4")]
fn input_shape_rank_three_panics() {
    let _ = Config::new().input_shape(vec![224, 224, 3]);
}

#[test]
#[should_panic(expected = "monitored statistic must be meanx or meanx2")]
fn monitor_delta_panics() {
    let _ = Config::new().monitor(StreamName::VANILLA_GRAD_MASK, Statistic::AbsDelta);
}

#[test]
fn builder_chain_valid() {
    let config = Config::new()
        .seed(9)
        .batch_size(16)
        .max_batches(20)
        .min_change(1e-3)
        .method(Method::IntegratedGradients)
        .output_layer(OutputLayer::Softmax);
    assert_eq!(config.batch_size, 16);
    assert_eq!(config.method, Method::IntegratedGradients);
    assert!(config.validate().is_ok());
}

// =============================================================================
// DESERIALIZED CONFIGURATIONS
// =============================================================================

#[test]
fn zero_batch_size_rejected_by_validate() {
    let config: Config = serde_json::from_str(r#"{"batch_size": 0}"#).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn unknown_method_fails_to_parse() {
    assert!(serde_json::from_str::<Config>(r#"{"method": "occlusion"}"#).is_err());
}

#[test]
fn json_file_roundtrip() {
    let dir = std::env::temp_dir().join(format!("saliency-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("run.json");

    let config = Config::quick().seed(5).method(Method::SmoothGrad).noise_level(0.1);
    std::fs::write(&path, config.to_json_pretty().unwrap()).unwrap();
    assert_eq!(Config::from_json_file(&path).unwrap(), config);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_file_is_io_error() {
    let err = Config::from_json_file("/nonexistent/saliency.json").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
