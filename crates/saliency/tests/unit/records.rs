//! Exported records and tensor files.

use std::sync::Arc;

use saliency::neighborhoods::uniform_tensor;
use saliency::output::{
    read_tensor, stream_records, to_json, write_records, write_tensors, CSV_HEADER,
};
use saliency::{Config, Explainer, Explanation, Key, LinearScorer, Statistic};

fn explanation() -> Explanation {
    let config = Config::quick()
        .input_shape(vec![1, 4, 4, 3])
        .num_classes(3)
        .max_batches(4)
        .image_index(12);
    let scorer = LinearScorer::random(
        &Key::new(1),
        &config.input_shape,
        config.num_classes,
        config.output_layer,
    )
    .unwrap();
    let explainer = Explainer::new(config, Arc::new(scorer)).unwrap();
    explainer
        .explain(&uniform_tensor(&Key::new(2), &[1, 4, 4, 3]), 1)
        .unwrap()
}

#[test]
fn one_record_per_statistic_plus_counter() {
    let explanation = explanation();
    let records = stream_records(&explanation);

    // three outputs x two moments, the monitored delta and the batch counter
    assert_eq!(records.len(), 8);
    let counter = records
        .iter()
        .find(|r| r.stream == "batch_index")
        .unwrap();
    assert_eq!(counter.statistic, Statistic::None);
    assert_eq!(counter.mean, explanation.batches() as f32);
    assert!(records.iter().all(|r| r.image_index == 12 && r.label == 1));
}

#[test]
fn csv_has_header_and_rows() {
    let records = stream_records(&explanation());
    let mut buffer = Vec::new();
    write_records(&records, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();

    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));
    let columns = CSV_HEADER.split(',').count();
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), records.len());
    assert!(rows.iter().all(|row| row.split(',').count() == columns));
    assert!(rows.iter().any(|row| row.contains("vanilla_grad_mask,meanx2,1x4x4x3")));
}

#[test]
fn tensors_written_for_running_moments() {
    let mut records = stream_records(&explanation());
    let dir = std::env::temp_dir().join(format!("saliency-records-{}", std::process::id()));
    write_tensors(&mut records, &dir).unwrap();

    for record in &records {
        match &record.data_path {
            Some(path) => assert_eq!(&read_tensor(path).unwrap(), record.tensor()),
            None => assert!(!record.statistic.is_running_moment()),
        }
    }
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn summary_json_carries_stop_reason() {
    let json = to_json(&explanation()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value["stop"]["reason"].is_string());
    assert_eq!(value["config"]["image_index"], 12);
    assert_eq!(value["label"], 1);
}
