//! Stats subcommand - accumulate global mean/variance feature statistics.

use crate::cli::DataArgs;
use crate::config::DataConfig;
use color_eyre::Section;
use eyre::{Context, Result};
use speechpipe::config::{DEFAULT_SEED, PipelineConfig};
use speechpipe::dataset::Dataset;
use speechpipe::mvn::MeanVarNormalizer;
use speechpipe::pipe::DataPipe;
use speechpipe::stats::compute_mean_var_stats;
use speechpipe::view::DatasetView;
use std::path::PathBuf;
use std::time::Instant;

/// CLI arguments for statistics accumulation.
#[derive(clap::Args, Debug)]
pub struct Args {
    #[command(flatten)]
    pub data: DataArgs,

    /// Samples per batch
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Worker threads
    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    /// Base seed; worker `w` uses `seed + w`
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Output statistics JSON
    #[arg(short, long)]
    pub output: PathBuf,

    /// Also write the plain-text normalizer derived from the statistics
    #[arg(long)]
    pub norm: Option<PathBuf>,
}

/// Resolved configuration for statistics accumulation.
#[derive(Debug)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub dataset: Dataset,
    pub batch_size: usize,
    pub workers: usize,
    pub seed: u64,
    pub output: PathBuf,
    pub norm: Option<PathBuf>,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let DataConfig { pipeline, dataset } = args.data.try_into()?;

        Ok(Self {
            pipeline,
            dataset,
            batch_size: args.batch_size,
            workers: args.workers,
            seed: args.seed,
            output: args.output,
            norm: args.norm,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let pipe = DataPipe::features_from_config(&config.pipeline);
    let view = DatasetView::new(&config.dataset);

    let s = Instant::now();

    let stats = compute_mean_var_stats(
        &view,
        &pipe,
        config.batch_size,
        config.workers,
        config.seed,
    )
    .wrap_err("failed to compute mean/var stats")?;

    tracing::info!(
        frames = stats.n,
        duration = %format!("{:.2}s", s.elapsed().as_secs_f32()),
        "stats accumulated"
    );

    stats
        .dump(&config.output)
        .wrap_err_with(|| format!("failed to write stats: {:?}", config.output.display()))?;

    if let Some(norm_path) = &config.norm {
        MeanVarNormalizer::from_stats(&stats)
            .wrap_err("no frames accumulated")
            .with_suggestion(|| "check the dataset filters and feature extractor settings")?
            .dump(norm_path)
            .wrap_err_with(|| format!("failed to write normalizer: {:?}", norm_path.display()))?;
    }

    Ok(())
}
