//! One record per exported statistic, as CSV rows plus JSON tensor files.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use saliency_core::{Statistic, Tensor};

use crate::error::OutputError;
use crate::methods::Method;
use crate::runner::Explanation;

/// Header row written by [`write_csv`].
pub const CSV_HEADER: &str = "image_index,label,method,stream,statistic,shape,batch_index,reason,delta,min,max,mean,seed,batch_size,max_batches,min_change,alpha,noise_level,data_path";

/// Summary of one accumulator entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamRecord {
    /// Dataset index of the explained image.
    pub image_index: usize,
    /// Explained label.
    pub label: usize,
    /// Explanation method.
    pub method: Method,
    /// Stream name.
    pub stream: String,
    /// Statistic kind.
    pub statistic: Statistic,
    /// Tensor shape.
    pub shape: Vec<usize>,
    /// Batches drawn when the run stopped.
    pub batch_index: usize,
    /// `converged` or `budget_exhausted`.
    pub reason: &'static str,
    /// Monitored delta at the stop.
    pub delta: f32,
    /// Smallest element.
    pub min: f32,
    /// Largest element.
    pub max: f32,
    /// Mean element.
    pub mean: f32,
    /// Run seed.
    pub seed: u64,
    /// Run batch size.
    pub batch_size: usize,
    /// Run batch budget.
    pub max_batches: usize,
    /// Run convergence threshold.
    pub min_change: f32,
    /// Noise-interpolation alpha.
    pub alpha: f64,
    /// Smooth-grad noise level.
    pub noise_level: f64,
    /// JSON file holding the full tensor, once written.
    pub data_path: Option<PathBuf>,
    #[serde(skip)]
    tensor: Tensor,
}

impl StreamRecord {
    /// The summarized tensor.
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// File name the tensor is stored under.
    pub fn file_name(&self) -> String {
        format!(
            "{}_img{}_a{}_{}_{}.json",
            self.method, self.image_index, self.alpha, self.stream, self.statistic
        )
    }

    fn shape_label(&self) -> String {
        self.shape
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join("x")
    }
}

/// Records for every statistic of `explanation`, including the batch counter.
pub fn stream_records(explanation: &Explanation) -> Vec<StreamRecord> {
    let config = &explanation.config;
    let reason = explanation.reason();
    explanation
        .stats()
        .clone()
        .into_streams()
        .into_iter()
        .map(|(key, tensor)| {
            let (min, max) = tensor
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| {
                    (lo.min(x), hi.max(x))
                });
            StreamRecord {
                image_index: config.image_index,
                label: explanation.label,
                method: config.method,
                stream: key.name.to_string(),
                statistic: key.statistic,
                shape: tensor.shape().to_vec(),
                batch_index: explanation.batches(),
                reason: reason.label(),
                delta: reason.delta(),
                min,
                max,
                mean: tensor.mean().unwrap_or(f32::NAN),
                seed: config.seed,
                batch_size: config.batch_size,
                max_batches: config.max_batches,
                min_change: config.min_change,
                alpha: config.alpha,
                noise_level: config.noise_level,
                data_path: None,
                tensor,
            }
        })
        .collect()
}

/// Write every record's tensor as JSON into `dir` and fill in `data_path`.
///
/// Scalar bookkeeping streams (the batch counter and deltas) are kept inline
/// in the CSV only.
pub fn write_tensors(records: &mut [StreamRecord], dir: &Path) -> Result<(), OutputError> {
    fs::create_dir_all(dir)?;
    for record in records.iter_mut() {
        if !record.statistic.is_running_moment() {
            continue;
        }
        let path = dir.join(record.file_name());
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, &record.tensor)?;
        writer.flush()?;
        record.data_path = Some(path);
    }
    Ok(())
}

/// Read back a tensor written by [`write_tensors`].
pub fn read_tensor(path: &Path) -> Result<Tensor, OutputError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(io::BufReader::new(file))?)
}

/// Write records to CSV.
pub fn write_csv(records: &[StreamRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_records(records, &mut writer)?;
    writer.flush()
}

/// Write records as CSV to any writer.
pub fn write_records<W: Write>(records: &[StreamRecord], writer: &mut W) -> io::Result<()> {
    writeln!(writer, "{}", CSV_HEADER)?;

    for r in records {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{},{},{},{},{},{},{}",
            r.image_index,
            r.label,
            r.method,
            r.stream,
            r.statistic,
            r.shape_label(),
            r.batch_index,
            r.reason,
            r.delta,
            r.min,
            r.max,
            r.mean,
            r.seed,
            r.batch_size,
            r.max_batches,
            r.min_change,
            r.alpha,
            r.noise_level,
            r.data_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        )?;
    }
    Ok(())
}
