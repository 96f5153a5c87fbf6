//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use eyre::Result;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "speechpipe")]
#[command(about = "Speech recognition data pipeline tools")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Accumulate global mean/variance feature statistics over a dataset
    Stats(crate::stats::Args),

    /// Derive a plain-text mean/variance normalizer from statistics
    Norm(crate::norm::Args),

    /// Run the full pipeline on a few batches and print their shapes
    Inspect(crate::inspect::Args),
}

/// Pipeline config, subset registry and dataset selection shared by
/// subcommands that read a corpus.
#[derive(clap::Args, Debug)]
pub struct DataArgs {
    /// Pipeline config YAML
    #[arg(short, long)]
    pub config: PathBuf,

    /// Subset registry YAML mapping subset id to dir and metadata
    #[arg(long)]
    pub db: PathBuf,

    /// Dataset name in the config's `datasets` section
    #[arg(long, default_value = "train")]
    pub set: String,
}

/// Execute CLI command - separated for testing.
pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Stats(args) => crate::stats::execute(args.try_into()?),
        Commands::Norm(args) => crate::norm::execute(args.try_into()?),
        Commands::Inspect(args) => crate::inspect::execute(args.try_into()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speechpipe::config::DEFAULT_SEED;

    #[test]
    fn parses_stats_command() {
        let cli = Cli::parse_from([
            "speechpipe",
            "stats",
            "--config",
            "config.yaml",
            "--db",
            "db.yaml",
            "-o",
            "stats.json",
        ]);

        match &cli.command {
            Commands::Stats(crate::stats::Args {
                data: DataArgs { config, db, set },
                batch_size: 16,
                workers: 8,
                seed,
                output,
                norm: None,
            }) if config.to_str() == Some("config.yaml")
                && db.to_str() == Some("db.yaml")
                && set == "train"
                && *seed == DEFAULT_SEED
                && output.to_str() == Some("stats.json") => {}
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_stats_with_options() {
        let cli = Cli::parse_from([
            "speechpipe",
            "stats",
            "-c",
            "config.yaml",
            "--db",
            "db.yaml",
            "--set",
            "dev",
            "--batch-size",
            "4",
            "--workers",
            "2",
            "--seed",
            "1",
            "-o",
            "stats.json",
            "--norm",
            "norm.txt",
        ]);

        match &cli.command {
            Commands::Stats(crate::stats::Args {
                data: DataArgs { set, .. },
                batch_size: 4,
                workers: 2,
                seed: 1,
                norm: Some(norm),
                ..
            }) if set == "dev" && norm.to_str() == Some("norm.txt") => {}
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_norm_command() {
        let cli = Cli::parse_from(["speechpipe", "norm", "stats.json", "norm.txt"]);

        match &cli.command {
            Commands::Norm(crate::norm::Args { stats, output })
                if stats.to_str() == Some("stats.json") && output.to_str() == Some("norm.txt") => {}
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_inspect_command() {
        let cli = Cli::parse_from([
            "speechpipe",
            "inspect",
            "-c",
            "config.yaml",
            "--db",
            "db.yaml",
            "--shuffle",
            "--num-batches",
            "3",
        ]);

        match &cli.command {
            Commands::Inspect(crate::inspect::Args {
                batch_size: 4,
                num_batches: 3,
                shuffle: true,
                seed,
                ..
            }) if *seed == DEFAULT_SEED => {}
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn stats_requires_output() {
        let result = Cli::try_parse_from([
            "speechpipe",
            "stats",
            "--config",
            "config.yaml",
            "--db",
            "db.yaml",
        ]);

        assert!(result.is_err());
    }
}
