//! speechpipe: data pipeline for training speech recognition models.
//!
//! Turns tab-separated corpus metadata into padded feature and target
//! batches.
//!
//! # Architecture
//!
//! - [`dataset::Dataset`] loads [`sample::Sample`] records from registered
//!   subsets, filtered by [`sample::SampleLoader`]
//! - [`view::DatasetView`] reorders, draws, repeats and shards indices over a
//!   dataset without touching it
//! - [`pipe::DataPipe`] runs each batch through the [`stage`] chain and pads
//!   the results into a [`pipe::Batch`]
//! - [`stats::compute_mean_var_stats`] accumulates global feature statistics
//!   for [`mvn::MeanVarNormalizer`]
//!
//! Every random choice draws from an explicitly passed RNG.
//!
//! # Quick Start
//!
//! ```ignore
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//! use speechpipe::config::PipelineConfig;
//! use speechpipe::dataset::{Dataset, SubsetRegistry};
//! use speechpipe::pipe::DataPipe;
//! use speechpipe::view::DatasetView;
//!
//! let config = PipelineConfig::from_file("config.yaml")?;
//! let registry = SubsetRegistry::from_file("db.yaml")?;
//! let dataset = Dataset::load(&registry, config.dataset("train")?, &config.sample_loader)?;
//!
//! let pipe = DataPipe::from_config(&config, config.load_mean_var_norm()?)?;
//! let mut rng = StdRng::seed_from_u64(37927);
//!
//! let mut view = DatasetView::new(&dataset);
//! view.shuffle(&mut rng);
//!
//! for mut samples in view.batches(16) {
//!     let batch = pipe.process(&mut samples, &mut rng)?;
//!     println!("{:?}", batch.inputs.dim());
//! }
//! ```

pub mod audio;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fbank;
pub mod mvn;
pub mod perturb;
pub mod pipe;
pub mod resample;
pub mod sample;
pub mod spec_augment;
pub mod stage;
pub mod stats;
pub mod text;
pub mod tokenizer;
pub mod view;
