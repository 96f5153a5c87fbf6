//! Norm subcommand - derive a plain-text normalizer from statistics.

use color_eyre::Section;
use eyre::{Context, Result};
use speechpipe::mvn::{MeanVarNormalizer, MeanVarStats};
use std::path::PathBuf;

/// CLI arguments for normalizer derivation.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Statistics JSON written by `speechpipe stats`
    pub stats: PathBuf,

    /// Output normalizer path
    pub output: PathBuf,
}

/// Resolved configuration for normalizer derivation.
#[derive(Debug)]
pub struct Config {
    pub stats: MeanVarStats,
    pub output: PathBuf,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let stats = MeanVarStats::load(&args.stats)
            .wrap_err_with(|| format!("failed to load stats: {:?}", args.stats.display()))
            .with_suggestion(|| "generate statistics with `speechpipe stats`")?;

        Ok(Self {
            stats,
            output: args.output,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let norm = MeanVarNormalizer::from_stats(&config.stats).wrap_err("invalid mean/var stats")?;

    norm.dump(&config.output)
        .wrap_err_with(|| format!("failed to write normalizer: {:?}", config.output.display()))?;

    tracing::info!(
        dim = norm.dim(),
        frames = config.stats.n,
        path = ?config.output.display(),
        "normalizer written"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_normalizer_from_stats() {
        let dir = std::env::temp_dir().join(format!("speechpipe-norm-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let stats_path = dir.join("stats.json");
        let norm_path = dir.join("norm.txt");

        let stats = MeanVarStats {
            o1_sum: vec![2.0, 4.0],
            o2_sum: vec![4.0, 16.0],
            n: 2,
        };
        stats.dump(&stats_path).unwrap();

        let config: Config = Args {
            stats: stats_path,
            output: norm_path.clone(),
        }
        .try_into()
        .unwrap();
        execute(config).unwrap();

        let norm = MeanVarNormalizer::load(&norm_path).unwrap();
        assert_eq!(norm.shift.to_vec(), vec![-1.0, -2.0]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_stats_fails() {
        let result: Result<Config> = Args {
            stats: "/nonexistent/stats.json".into(),
            output: "norm.txt".into(),
        }
        .try_into();

        assert!(result.is_err());
    }
}
