//! Configuration types for resolved CLI arguments.
//!
//! This module contains Config structs and their TryFrom implementations.
//! Args structs (for CLI parsing) remain in cli.rs.

use crate::cli::DataArgs;
use eyre::{Context, Result};
use speechpipe::config::PipelineConfig;
use speechpipe::dataset::{Dataset, SubsetRegistry};

/// Loaded pipeline config and the selected dataset.
///
/// Converted from DataArgs via TryFrom.
#[derive(Debug)]
pub struct DataConfig {
    pub pipeline: PipelineConfig,
    pub dataset: Dataset,
}

impl TryFrom<DataArgs> for DataConfig {
    type Error = eyre::Error;

    fn try_from(args: DataArgs) -> Result<Self> {
        let pipeline = PipelineConfig::from_file(&args.config)
            .wrap_err_with(|| format!("failed to load config: {:?}", args.config.display()))?;

        let registry = SubsetRegistry::from_file(&args.db)
            .wrap_err_with(|| format!("failed to load subset registry: {:?}", args.db.display()))?;

        let descriptor = pipeline.dataset(&args.set)?;
        let dataset = Dataset::load(&registry, descriptor, &pipeline.sample_loader)
            .wrap_err_with(|| format!("failed to load dataset: {}", args.set))?;

        tracing::info!(set = %args.set, samples = dataset.len(), "dataset ready");

        Ok(Self { pipeline, dataset })
    }
}
