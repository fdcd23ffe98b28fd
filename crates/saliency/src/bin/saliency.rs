//! Command-line driver for saliency explanations.
//!
//! # Usage
//!
//! ```bash
//! # Sweep noise-interpolation alpha on a synthetic image
//! cargo run --bin saliency -- gather --alphas "0.1,0.3,0.5" --output ./results/
//!
//! # Start from a JSON config, override the method
//! cargo run --bin saliency -- gather --config run.json --method smooth_grad
//!
//! # Print the effective configuration
//! cargo run --bin saliency -- config --batch-size 64
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use saliency::masking::accuracy_curve;
use saliency::neighborhoods::uniform_tensor;
use saliency::output::{
    format_accuracy, format_explanation, stream_records, write_csv, write_tensors,
    ExplanationSummary, StreamRecord,
};
use saliency::{
    Config, ConfigError, Error, Explainer, Explanation, Key, LinearScorer, Method, OutputError,
    QDirection, Result, Scorer, SharedScorer,
};

/// Stochastic saliency explanations with convergence-gated sampling
#[derive(Parser, Debug)]
#[command(name = "saliency")]
#[command(about = "Gather converged saliency statistics for stochastic explanation methods")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one method over a sweep of alpha values and export the statistics
    Gather {
        #[command(flatten)]
        run: RunArgs,

        /// Alpha values to sweep (comma-separated, noise_interpolation only)
        #[arg(long, default_value = "0.5")]
        alphas: String,

        /// Explained label (default: the scorer's prediction on the image)
        #[arg(long)]
        label: Option<usize>,

        /// Removal percentages for deletion accuracy (comma-separated)
        #[arg(long)]
        accuracy: Option<String>,

        /// Output directory for records and tensors
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Skip writing CSV records and tensor files
        #[arg(long)]
        no_csv: bool,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        run: RunArgs,
    },
}

/// Configuration source and overrides shared by every subcommand.
#[derive(Args, Debug)]
struct RunArgs {
    /// JSON configuration file (defaults to the quick preset)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Explanation method: noise_interpolation, smooth_grad, integrated_gradients, fisher_information
    #[arg(short, long)]
    method: Option<Method>,

    /// Base seed
    #[arg(long)]
    seed: Option<u64>,

    /// Keys per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Batch budget
    #[arg(long)]
    max_batches: Option<usize>,

    /// Convergence threshold on the monitored statistic
    #[arg(long)]
    min_change: Option<f32>,

    /// Index of the synthetic image
    #[arg(long)]
    image_index: Option<usize>,
}

impl RunArgs {
    fn load(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::quick(),
        };
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(max_batches) = self.max_batches {
            config.max_batches = max_batches;
        }
        if let Some(min_change) = self.min_change {
            config.min_change = min_change;
        }
        if let Some(image_index) = self.image_index {
            config.image_index = image_index;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let result = match cli.command {
        Commands::Gather {
            run,
            alphas,
            label,
            accuracy,
            output,
            no_csv,
        } => handle_gather(&run, &alphas, label, accuracy.as_deref(), &output, no_csv),
        Commands::Config { run } => handle_config(&run),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn parse_list(list: &str, what: &str) -> Result<Vec<f64>> {
    list.split(',')
        .map(|s| {
            s.trim().parse::<f64>().map_err(|_| {
                Error::from(ConfigError::Invalid(format!("invalid {what} value `{}`", s.trim())))
            })
        })
        .collect()
}

fn handle_config(run: &RunArgs) -> Result<()> {
    println!("{}", run.load()?.to_json_pretty()?);
    Ok(())
}

fn handle_gather(
    run: &RunArgs,
    alphas: &str,
    label: Option<usize>,
    accuracy: Option<&str>,
    output: &Path,
    no_csv: bool,
) -> Result<()> {
    let base = run.load()?;
    let configs = base.alpha_sweep(&parse_list(alphas, "alpha")?)?;
    let removals = accuracy.map(|list| parse_list(list, "accuracy")).transpose()?;

    // Synthetic input and demo scorer, both derived from the seed
    let root = Key::new(base.seed);
    let image = uniform_tensor(&root.fold_in(base.image_index as u64), &base.input_shape);
    let scorer: SharedScorer = Arc::new(LinearScorer::random(
        &root.fold_in(u64::MAX),
        &base.input_shape,
        base.num_classes,
        base.output_layer,
    )?);
    let label = match label {
        Some(label) => label,
        None => predicted_label(scorer.as_ref(), &image)?,
    };

    println!("=== Saliency Gather ===\n");
    println!("Configuration:");
    println!("  Method: {}", base.method);
    println!("  Input shape: {:?}", base.input_shape);
    println!("  Classes: {} ({})", base.num_classes, base.output_layer);
    println!("  Label: {}", label);
    if base.method == Method::NoiseInterpolation {
        let alphas: Vec<f64> = configs.iter().map(|c| c.alpha).collect();
        println!("  Alphas: {:?}", alphas);
    }
    println!(
        "  Batches: {} x {} keys (min change {:.1e})",
        base.max_batches, base.batch_size, base.min_change
    );
    println!();

    let total_work = configs.len() * base.max_batches;
    let progress_bar = ProgressBar::new(total_work as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {msg}",
    ) {
        progress_bar.set_style(style.progress_chars("=>-"));
    }

    let start = Instant::now();
    let mut explanations: Vec<Explanation> = Vec::with_capacity(configs.len());
    for (i, config) in configs.into_iter().enumerate() {
        progress_bar.set_message(match config.method {
            Method::NoiseInterpolation => format!("alpha {}", config.alpha),
            method => method.to_string(),
        });
        let explainer = Explainer::new(config, scorer.clone())?;

        let offset = (i * base.max_batches) as u64;
        let explanation = explainer.explain_observed(&image, label, |stats| {
            progress_bar.set_position(offset + stats.batch_index() as u64);
        })?;
        progress_bar.set_position(offset + base.max_batches as u64);
        explanations.push(explanation);
    }
    progress_bar.finish_with_message("Complete!");
    println!("\nCompleted in {:.1}s\n", start.elapsed().as_secs_f64());

    for explanation in &explanations {
        println!("{}", format_explanation(explanation));
        if let (Some(removals), Some(saliency)) = (&removals, explanation.saliency()) {
            let curve = accuracy_curve(
                scorer.as_ref(),
                &image,
                saliency,
                label,
                removals,
                QDirection::Deletion,
            )?;
            println!("{}", format_accuracy(&curve));
        }
    }

    if no_csv {
        return Ok(());
    }
    fs::create_dir_all(output).map_err(OutputError::from)?;

    let mut records: Vec<StreamRecord> = explanations.iter().flat_map(stream_records).collect();
    write_tensors(&mut records, &output.join("tensors"))?;

    let csv_path = output.join("records.csv");
    write_csv(&records, &csv_path).map_err(OutputError::from)?;
    println!("Wrote records to: {}", csv_path.display());

    let summaries: Vec<ExplanationSummary<'_>> =
        explanations.iter().map(ExplanationSummary::from).collect();
    let summary_path = output.join("summary.json");
    let json = serde_json::to_string_pretty(&summaries).map_err(OutputError::from)?;
    fs::write(&summary_path, json).map_err(OutputError::from)?;
    println!("Wrote summary to: {}", summary_path.display());

    Ok(())
}

fn predicted_label(scorer: &dyn Scorer, image: &saliency::Tensor) -> Result<usize> {
    let outputs = scorer.forward(image)?;
    Ok(outputs
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &x)| {
            if x > best.1 {
                (i, x)
            } else {
                best
            }
        })
        .0)
}
