//! Consistency and accuracy-at-q on explanation outputs.

use std::sync::Arc;

use ndarray::{stack, Axis, IxDyn};

use saliency::masking::{accuracy_curve, saliency_mask};
use saliency::neighborhoods::uniform_tensor;
use saliency::{
    accuracy_at_q, Config, ConsistencyMeasure, Explainer, Key, LinearScorer, OutputLayer,
    QDirection, Scorer, Tensor,
};

// =============================================================================
// CONSISTENCY
// =============================================================================

#[test]
fn repeated_runs_are_consistent() {
    let config = Config::quick()
        .input_shape(vec![1, 20, 20, 3])
        .num_classes(3)
        .max_batches(10);
    let scorer =
        LinearScorer::random(&Key::new(1), &config.input_shape, 3, OutputLayer::LogSoftmax).unwrap();
    let scorer = Arc::new(scorer);
    let image = uniform_tensor(&Key::new(2), &[1, 20, 20, 3]);

    // Same seed twice gives identical maps
    let maps: Vec<Tensor> = (0..3)
        .map(|_| {
            let explainer = Explainer::new(config.clone(), scorer.clone()).unwrap();
            let explanation = explainer.explain(&image, 0).unwrap();
            explanation.saliency().unwrap().index_axis(Axis(0), 0).to_owned()
        })
        .collect();
    let views: Vec<_> = maps.iter().map(|m| m.view()).collect();
    let group = stack(Axis(0), &views).unwrap().insert_axis(Axis(0));
    assert_eq!(group.shape(), &[1, 3, 20, 20, 3]);

    let distances = ConsistencyMeasure::default().measure(&group).unwrap();
    assert!(distances[0].abs() < 1e-5);
}

#[test]
fn opposite_maps_have_distance_two() {
    let positive = Tensor::ones(IxDyn(&[20, 20, 1]));
    let negative = positive.mapv(|x| -x);
    let group = stack(Axis(0), &[positive.view(), negative.view()])
        .unwrap()
        .insert_axis(Axis(0));
    let distances = ConsistencyMeasure::new(2).measure(&group).unwrap();
    assert!((distances[0] - 2.0).abs() < 1e-5);
}

// =============================================================================
// ACCURACY AT Q
// =============================================================================

/// Class 0 fires on the left half of the image, class 1 on the right half.
fn halves_scorer() -> LinearScorer {
    let features = 4 * 4;
    let weights = ndarray::Array2::from_shape_fn((2, features), |(c, f)| {
        let col = f % 4;
        match (c, col < 2) {
            (0, true) | (1, false) => 1.0,
            _ => 0.0,
        }
    });
    LinearScorer::new(weights, ndarray::Array1::zeros(2), OutputLayer::Logits).unwrap()
}

fn left_saliency() -> Tensor {
    Tensor::from_shape_fn(IxDyn(&[1, 4, 4, 1]), |idx| if idx[2] < 2 { 1.0 } else { 0.0 })
}

#[test]
fn deleting_salient_half_flips_prediction() {
    let scorer = halves_scorer();
    let image = Tensor::ones(IxDyn(&[1, 4, 4, 1]));
    // Left half dominates slightly
    let image = image + &left_saliency() * 0.1;
    let logits = scorer.forward(&image).unwrap();
    assert!(logits[[0, 0]] > logits[[0, 1]]);

    let kept = accuracy_at_q(&scorer, &image, &left_saliency(), 0, 0.0, QDirection::Deletion).unwrap();
    assert!(kept.correct);
    assert_eq!(kept.actual_q, 1.0);

    let removed =
        accuracy_at_q(&scorer, &image, &left_saliency(), 0, 50.0, QDirection::Deletion).unwrap();
    assert!(!removed.correct);
    assert_eq!(removed.predicted, 1);
    assert!((removed.actual_q - 0.5).abs() < 1e-6);
}

#[test]
fn insertion_keeps_salient_half() {
    let scorer = halves_scorer();
    let image = Tensor::ones(IxDyn(&[1, 4, 4, 1]));
    let point =
        accuracy_at_q(&scorer, &image, &left_saliency(), 0, 60.0, QDirection::Insertion).unwrap();
    assert!(point.correct);
    assert!((point.actual_q - 0.5).abs() < 1e-6);
}

#[test]
fn curve_reports_each_removal() {
    let scorer = halves_scorer();
    let image = Tensor::ones(IxDyn(&[1, 4, 4, 1]));
    let curve = accuracy_curve(
        &scorer,
        &image,
        &left_saliency(),
        0,
        &[0.0, 25.0, 50.0, 75.0],
        QDirection::Deletion,
    )
    .unwrap();
    assert_eq!(curve.len(), 4);
    let kept: Vec<f32> = curve.iter().map(|p| p.actual_q).collect();
    assert!(kept.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn mask_broadcasts_over_channels() {
    let saliency = uniform_tensor(&Key::new(4), &[1, 8, 8, 3]);
    let mask = saliency_mask(&saliency, 20.0, QDirection::Deletion).unwrap();
    assert_eq!(mask.shape(), &[1, 8, 8, 1]);
    assert!((mask.mean().unwrap() - 0.8).abs() < 0.02);
}
