use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use genscore::config::{EvalConfig, Metric};
use genscore::evaluation::{inputs_with_prompt_file, onnx_evaluator};
use genscore::references::{self, DEFAULT_REFERENCE_COUNT, DEFAULT_REFERENCE_SIZE};
use log::{info, warn};

#[cfg(debug_assertions)]
const LOG_LEVEL: &str = "debug";
#[cfg(not(debug_assertions))]
const LOG_LEVEL: &str = "info";

/// Quality metrics for generated images: Fréchet Inception Distance,
/// Inception Score and CLIP text-image similarity.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli
{
    /// JSON file with evaluation settings; flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Overrides
{
    #[arg(long, global = true)]
    inception_model: Option<PathBuf>,
    #[arg(long, global = true)]
    clip_visual_model: Option<PathBuf>,
    #[arg(long, global = true)]
    clip_text_model: Option<PathBuf>,
    /// Images per forward pass.
    #[arg(long, global = true)]
    batch_size: Option<usize>,
    /// Number of splits for the inception score.
    #[arg(long, global = true)]
    splits: Option<usize>,
    /// Allowed deviation of a probability row's sum from 1.
    #[arg(long, global = true)]
    distribution_tolerance: Option<f64>,
    #[arg(long, global = true)]
    eigen_tolerance: Option<f64>,
    #[arg(long, global = true)]
    intra_threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command
{
    /// Run every requested metric and write report.txt / report.json.
    Evaluate {
        #[arg(long)]
        generated: PathBuf,
        #[arg(long)]
        reference: Option<PathBuf>,
        /// Prompts, one per line (or a JSON array), in the sort order of the generated images.
        #[arg(long)]
        prompts: Option<PathBuf>,
        /// Metrics to run; defaults to the configured list.
        #[arg(long, value_enum, value_delimiter = ',')]
        metrics: Vec<Metric>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fréchet Inception Distance between two image directories.
    Fid {
        #[arg(long)]
        generated: PathBuf,
        #[arg(long)]
        reference: PathBuf,
    },
    /// Inception Score of a directory of generated images.
    InceptionScore {
        #[arg(long)]
        generated: PathBuf,
    },
    /// CLIP similarity between generated images and their prompts.
    ClipScore {
        #[arg(long)]
        generated: PathBuf,
        #[arg(long)]
        prompts: PathBuf,
    },
    /// Copy a seeded random sample of a larger image pool as the reference set.
    PrepareReferences {
        #[arg(long)]
        pool: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_REFERENCE_COUNT)]
        count: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Resize every image in a directory to a fixed square size.
    Resize {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_REFERENCE_SIZE)]
        size: u32,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<EvalConfig>
{
    let mut config = match &cli.config {
        Some(path) => EvalConfig::load(path).with_context(|| format!("Unable to load config {:?}", path))?,
        None => EvalConfig::default(),
    };

    let o = &cli.overrides;
    if let Some(path) = &o.inception_model {
        config.inception_model = path.clone();
    }
    if let Some(path) = &o.clip_visual_model {
        config.clip_visual_model = path.clone();
    }
    if let Some(path) = &o.clip_text_model {
        config.clip_text_model = path.clone();
    }
    if let Some(batch_size) = o.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(splits) = o.splits {
        config.splits = splits;
    }
    if let Some(tolerance) = o.distribution_tolerance {
        config.distribution_tolerance = tolerance;
    }
    if let Some(tolerance) = o.eigen_tolerance {
        config.eigen_tolerance = tolerance;
    }
    if let Some(threads) = o.intra_threads {
        config.intra_threads = threads;
    }

    Ok(config)
}

fn evaluate(
    config: EvalConfig,
    generated: &Path,
    reference: Option<&Path>,
    prompts: Option<&Path>,
    output: Option<&Path>,
) -> anyhow::Result<()>
{
    let evaluator = onnx_evaluator(config).context("Invalid evaluation settings")?;
    let inputs = inputs_with_prompt_file(generated, reference, prompts)?;

    let report = evaluator.run(&inputs).context("Evaluation aborted")?;
    println!("{}", report);

    if let Some(output) = output {
        report.save(output).with_context(|| format!("Unable to save report to {:?}", output))?;
    }
    if report.has_failures() {
        warn!("Some metrics failed; see the report for details");
    }
    Ok(())
}

fn main() -> anyhow::Result<()>
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(LOG_LEVEL)).init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match &cli.command {
        Command::Evaluate { generated, reference, prompts, metrics, output } => {
            if !metrics.is_empty() {
                config.metrics = metrics.clone();
            }
            evaluate(config, generated, reference.as_deref(), prompts.as_deref(), output.as_deref())?;
        }
        Command::Fid { generated, reference } => {
            config.metrics = vec![Metric::Fid];
            evaluate(config, generated, Some(reference.as_path()), None, None)?;
        }
        Command::InceptionScore { generated } => {
            config.metrics = vec![Metric::InceptionScore];
            evaluate(config, generated, None, None, None)?;
        }
        Command::ClipScore { generated, prompts } => {
            config.metrics = vec![Metric::ClipSimilarity];
            evaluate(config, generated, None, Some(prompts.as_path()), None)?;
        }
        Command::PrepareReferences { pool, output, count, seed } => {
            let copied = references::sample_references(pool, output, *count, *seed)
                .context("Unable to prepare reference images")?;
            info!("Copied {} reference images to {:?}", copied.len(), output);
        }
        Command::Resize { input, output, size } => {
            let written = references::resize_references(input, output, *size)
                .context("Unable to resize images")?;
            info!("All {} images resized to {}x{}", written, size, size);
        }
    }

    Ok(())
}
