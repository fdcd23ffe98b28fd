//! Output formatting and export for explanation runs.
//!
//! - Terminal: human-readable summary with colors and box drawing
//! - JSON: run summary without tensors
//! - Records: one CSV row per statistic, tensors as JSON files

mod json;
mod records;
mod terminal;

pub use json::{to_json, to_json_pretty, ExplanationSummary};
pub use records::{
    read_tensor, stream_records, write_csv, write_records, write_tensors, StreamRecord, CSV_HEADER,
};
pub use terminal::{format_accuracy, format_explanation};
