//! Inspect subcommand - run the full pipeline on a few batches.

use crate::cli::DataArgs;
use crate::config::DataConfig;
use eyre::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use speechpipe::config::DEFAULT_SEED;
use speechpipe::dataset::Dataset;
use speechpipe::pipe::{Batch, DataPipe};
use speechpipe::view::DatasetView;
use std::fmt::Write;

/// CLI arguments for batch inspection.
#[derive(clap::Args, Debug)]
pub struct Args {
    #[command(flatten)]
    pub data: DataArgs,

    /// Samples per batch
    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    /// Number of batches to process
    #[arg(long, default_value_t = 1)]
    pub num_batches: usize,

    /// Shuffle the dataset before batching
    #[arg(long)]
    pub shuffle: bool,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,
}

/// Resolved configuration for batch inspection.
#[derive(Debug)]
pub struct Config {
    pub pipe: DataPipe,
    pub dataset: Dataset,
    pub batch_size: usize,
    pub num_batches: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let DataConfig { pipeline, dataset } = args.data.try_into()?;

        let norm = pipeline
            .load_mean_var_norm()
            .wrap_err("failed to load mean/var normalizer")?;
        let pipe = DataPipe::from_config(&pipeline, norm).wrap_err("failed to build data pipe")?;

        Ok(Self {
            pipe,
            dataset,
            batch_size: args.batch_size,
            num_batches: args.num_batches,
            shuffle: args.shuffle,
            seed: args.seed,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    tracing::info!(stages = ?config.pipe.stages(), "data pipe ready");

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut view = DatasetView::new(&config.dataset);
    if config.shuffle {
        view.shuffle(&mut rng);
    }

    for (i, mut samples) in view
        .batches(config.batch_size)
        .take(config.num_batches)
        .enumerate()
    {
        let batch = config
            .pipe
            .process(&mut samples, &mut rng)
            .wrap_err_with(|| format!("failed to process batch {i}"))?;

        print!("{}", summarize(i, &batch));
    }

    Ok(())
}

/// Human-readable batch summary.
fn summarize(index: usize, batch: &Batch) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "batch {index}: {} utts, {} frames, inputs {:?}, targets {:?}",
        batch.num_utts,
        batch.num_frames,
        batch.inputs.dim(),
        batch.targets.dim()
    );

    for (i, sample) in batch.samples.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}  frames={} tokens={}  {}",
            sample.key, batch.input_lengths[i], batch.target_lengths[i], sample.text
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use speechpipe::pipe::ProcessedSample;

    #[test]
    fn summarizes_batch() {
        let sample = ProcessedSample {
            key: "utt1__vol0.5".to_string(),
            waveform: Vec::new(),
            sample_rate: 16000,
            feature: Array2::zeros((3, 2)),
            text: "HELLO".to_string(),
            token_pieces: vec!["HELLO".to_string()],
            token_ids: vec![4],
        };
        let batch = Batch {
            samples: vec![sample],
            num_utts: 1,
            num_frames: 3,
            inputs: Array3::zeros((1, 3, 2)),
            input_lengths: vec![3],
            targets: Array2::zeros((1, 1)),
            target_lengths: vec![1],
        };

        let text = summarize(0, &batch);

        assert_eq!(
            text,
            "batch 0: 1 utts, 3 frames, inputs (1, 3, 2), targets (1, 1)\n  utt1__vol0.5  frames=3 tokens=1  HELLO\n"
        );
    }
}
