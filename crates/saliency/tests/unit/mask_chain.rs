//! Mask processes chained into one sampled process.

use ndarray::IxDyn;

use saliency::neighborhoods::{bernoulli_mask, deterministic_mask, uniform_mask};
use saliency::operations::{convex_combination_mask, resize_mask};
use saliency::{Key, StreamName, Tensor};
use saliency_core::adaptive::{gather_stats, initial_stats, GatherConfig};
use saliency_core::process::{bind_all, concretize_all, sequential_call};
use saliency_core::{sample, AbstractProcess, Param, Statistic, StreamKey, VectorizedProcess};

const IMAGE: [usize; 4] = [1, 224, 224, 3];

/// alpha * uniform + (1 - alpha) * upsampled coarse bernoulli mask
fn chain() -> AbstractProcess {
    let mut processes = vec![
        deterministic_mask(),
        uniform_mask(),
        bernoulli_mask(),
        resize_mask(),
        convex_combination_mask(),
    ];
    processes[0]
        .bind("name", StreamName::new("alpha_mask"))
        .unwrap()
        .bind("mask", Tensor::from_elem(IxDyn(&[1, 1, 1, 1]), 0.5))
        .unwrap();
    processes[1]
        .bind("name", StreamName::new("uniform_mask"))
        .unwrap()
        .bind("shape", IMAGE.to_vec())
        .unwrap();
    processes[2]
        .bind("name", StreamName::new("bernoulli_mask"))
        .unwrap()
        .bind("shape", vec![1usize, 10, 10, 1])
        .unwrap()
        .bind("p", 0.5)
        .unwrap();
    processes[3]
        .bind("name", StreamName::new("resized_mask"))
        .unwrap()
        .bind("source_name", StreamName::new("bernoulli_mask"))
        .unwrap()
        .bind("shape", vec![1usize, 224, 224, 1])
        .unwrap();
    processes[4]
        .bind("name", StreamName::new("convex_combination_mask"))
        .unwrap()
        .bind("source_name", StreamName::new("resized_mask"))
        .unwrap()
        .bind("target_name", StreamName::new("uniform_mask"))
        .unwrap()
        .bind("alpha_name", StreamName::new("alpha_mask"))
        .unwrap();

    sequential_call(concretize_all(&mut processes).unwrap())
}

#[test]
fn chain_writes_every_mask() {
    let out = chain().concretize().unwrap().call(&Key::new(0)).unwrap();
    assert_eq!(out[&StreamName::new("alpha_mask")].shape(), &[1, 1, 1, 1]);
    assert_eq!(out[&StreamName::new("uniform_mask")].shape(), &IMAGE);
    assert_eq!(out[&StreamName::new("bernoulli_mask")].shape(), &[1, 10, 10, 1]);
    assert_eq!(out[&StreamName::new("resized_mask")].shape(), &[1, 224, 224, 1]);
    let combined = &out[&StreamName::new("convex_combination_mask")];
    assert_eq!(combined.shape(), &IMAGE);
    assert!(combined.iter().all(|&x| (0.0..=1.0).contains(&x)));
}

#[test]
fn vectorized_chain_stacks_lanes() {
    let process = VectorizedProcess::new(chain().concretize().unwrap());
    let batch = sample(42, 1, 4, &process).unwrap();
    assert_eq!(batch.size(), 4);
    assert_eq!(
        batch.get(&StreamName::new("convex_combination_mask")).unwrap().shape(),
        &[4, 1, 224, 224, 3]
    );
    assert_eq!(sample(42, 1, 4, &process).unwrap(), batch);
}

#[test]
fn bind_all_sets_shared_parameter() {
    let mut processes = vec![uniform_mask(), uniform_mask()];
    bind_all(&mut processes, "shape", Param::from(vec![1usize, 2, 2, 1])).unwrap();
    processes[0].bind("name", StreamName::new("a")).unwrap();
    processes[1].bind("name", StreamName::new("b")).unwrap();

    let out = sequential_call(concretize_all(&mut processes).unwrap())
        .concretize()
        .unwrap()
        .call(&Key::new(3))
        .unwrap();
    // each step draws from its own folded key
    assert_ne!(out[&StreamName::new("a")], out[&StreamName::new("b")]);
}

#[test]
fn chain_statistics_converge_to_expected_mean() {
    let mut process = chain();
    let first = process.clone().concretize().unwrap().call(&Key::new(0)).unwrap();
    let monitored = StreamKey::mean(StreamName::new("uniform_mask"));
    let stats = initial_stats(&first, &[Statistic::Mean], &monitored.delta());

    let config = GatherConfig::new(monitored.clone(), monitored.delta())
        .batch_size(8)
        .max_batches(30)
        .min_change(0.05);
    let outcome = gather_stats(&config, &mut process, stats).unwrap();

    let mean = outcome.stats.get(&monitored).unwrap().mean().unwrap();
    assert!((mean - 0.5).abs() < 0.01, "mean {mean}");
    assert!(process.is_concretized());
}
