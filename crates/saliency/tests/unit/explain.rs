//! End-to-end explanation runs with the linear demo scorer.

use std::sync::Arc;

use ndarray::IxDyn;

use saliency::neighborhoods::uniform_tensor;
use saliency::{
    Config, Explainer, Key, LinearScorer, Method, OutputLayer, SharedScorer, StreamName, Tensor,
};

fn small_config() -> Config {
    Config::quick()
        .input_shape(vec![1, 6, 6, 3])
        .num_classes(4)
        .batch_size(8)
        .max_batches(40)
}

fn scorer(config: &Config) -> SharedScorer {
    Arc::new(
        LinearScorer::random(
            &Key::new(100),
            &config.input_shape,
            config.num_classes,
            config.output_layer,
        )
        .unwrap(),
    )
}

fn image() -> Tensor {
    uniform_tensor(&Key::new(7), &[1, 6, 6, 3])
}

// =============================================================================
// METHODS
// =============================================================================

#[test]
fn every_method_produces_saliency() {
    for method in Method::ALL {
        let config = small_config().method(method);
        let explainer = Explainer::new(config.clone(), scorer(&config)).unwrap();
        let explanation = explainer.explain(&image(), 2).unwrap();

        let saliency = explanation.saliency().unwrap();
        assert_eq!(saliency.shape(), &[1, 6, 6, 3], "{method}");
        assert!(saliency.iter().all(|x| x.is_finite()), "{method}");
        assert!(explanation.batches() >= 1 && explanation.batches() <= 40);
    }
}

#[test]
fn alpha_zero_converges_after_two_batches() {
    // Without noise every sample is identical: the second batch moves nothing
    let config = small_config().alpha(0.0).min_change(1e-6);
    let explainer = Explainer::new(config.clone(), scorer(&config)).unwrap();
    let explanation = explainer.explain(&image(), 1).unwrap();

    assert!(explanation.reason().is_converged());
    assert_eq!(explanation.batches(), 2);
    let variance = explanation.variance(&StreamName::VANILLA_GRAD_MASK).unwrap();
    assert!(variance.iter().all(|&v| v.abs() < 1e-4));
}

#[test]
fn linear_logits_gradient_is_constant() {
    // For a logits scorer the input gradient is the weight row of the label
    let config = small_config()
        .output_layer(OutputLayer::Logits)
        .method(Method::SmoothGrad)
        .min_change(1e-6);
    let explainer = Explainer::new(config.clone(), scorer(&config)).unwrap();
    let explanation = explainer.explain(&image(), 3).unwrap();

    assert_eq!(explanation.batches(), 2);
    let mean = explanation.mean(&StreamName::VANILLA_GRAD_MASK).unwrap();
    let second = explanation.second_moment(&StreamName::VANILLA_GRAD_MASK).unwrap();
    for (m, s) in mean.iter().zip(second.iter()) {
        assert!((m * m - s).abs() < 1e-5);
    }
}

#[test]
fn tight_threshold_exhausts_budget() {
    let config = small_config().alpha(1.0).min_change(1e-9).max_batches(3);
    let explainer = Explainer::new(config.clone(), scorer(&config)).unwrap();
    let explanation = explainer.explain(&image(), 0).unwrap();

    assert!(!explanation.reason().is_converged());
    assert_eq!(explanation.batches(), 3);
    assert_eq!(explanation.samples(), 24);
}

#[test]
fn same_seed_same_statistics() {
    let config = small_config().method(Method::FisherInformation);
    let explainer = Explainer::new(config.clone(), scorer(&config)).unwrap();
    let a = explainer.explain(&image(), 1).unwrap();
    let b = explainer.explain(&image(), 1).unwrap();
    assert_eq!(a, b);

    let other = Explainer::new(config.clone().seed(43), scorer(&config)).unwrap();
    assert_ne!(other.explain(&image(), 1).unwrap().stats(), a.stats());
}

#[test]
fn integrated_gradients_with_resized_baseline() {
    let config = small_config().method(Method::IntegratedGradients);
    let explainer = Explainer::new(config.clone(), scorer(&config)).unwrap();
    let mut process = explainer.process(&image(), 0).unwrap();
    // 3x3 baseline does not broadcast against 6x6 and gets resized
    process
        .bind("baseline", Tensor::from_elem(IxDyn(&[1, 3, 3, 3]), 0.25))
        .unwrap();
    let out = process.concretize().unwrap().call(&Key::new(1)).unwrap();
    assert_eq!(out[&StreamName::VANILLA_GRAD_MASK].shape(), &[1, 6, 6, 3]);
}

#[test]
fn observer_sees_every_batch() {
    let config = small_config().alpha(1.0).min_change(1e-9).max_batches(5);
    let explainer = Explainer::new(config.clone(), scorer(&config)).unwrap();
    let seen = std::sync::Mutex::new(Vec::new());
    explainer
        .explain_observed(&image(), 0, |stats| {
            seen.lock().unwrap().push(stats.batch_index());
        })
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}
