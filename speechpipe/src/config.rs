//! Pipeline configuration loaded from YAML.

use crate::dataset::DatasetConfig;
use crate::error::{ConfigError, Result};
use crate::fbank::FbankExtractor;
use crate::mvn::MeanVarNormalizer;
use crate::perturb::Perturbation;
use crate::resample::Resampler;
use crate::sample::SampleLoader;
use crate::spec_augment::SpecAugment;
use crate::text::TextNormalizer;
use crate::tokenizer::TokenizerConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 37927;

/// Stage settings and named dataset descriptors.
///
/// Absent stage sections leave that stage disabled. Unknown keys are rejected
/// at every level.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sample_loader: SampleLoader,
    #[serde(default)]
    pub resampler: Option<Resampler>,
    #[serde(default)]
    pub perturbation: Option<Perturbation>,
    pub fbank_feature_extractor: FbankExtractor,
    /// Plain-text normalizer written by a previous stats pass
    #[serde(default)]
    pub mean_var_norm: Option<PathBuf>,
    #[serde(default)]
    pub spec_augment: Option<SpecAugment>,
    #[serde(default)]
    pub text_normalizer: Option<TextNormalizer>,
    #[serde(default)]
    pub tokenizer: Option<TokenizerConfig>,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetConfig>,
}

impl PipelineConfig {
    /// Load and validate a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| ConfigError::FileNotFound(path.to_path_buf()))?;
        let config: Self = serde_yaml::from_reader(file)?;
        config.validate()?;

        tracing::debug!(?path, datasets = config.datasets.len(), "pipeline config loaded");

        Ok(config)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value domains that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let loader = &self.sample_loader;
        check_range("duration", loader.min_duration, loader.max_duration)?;
        check_range(
            "text_length",
            loader.min_text_length as f64,
            loader.max_text_length as f64,
        )?;

        if self.resampler.is_some_and(|r| r.sample_rate == 0) {
            return Err(invalid("resampler.sample_rate", 0.0));
        }

        if let Some(perturbation) = &self.perturbation {
            for (name, factors) in [
                ("perturbation.speeds", &perturbation.speeds),
                ("perturbation.tempos", &perturbation.tempos),
                ("perturbation.volumes", &perturbation.volumes),
            ] {
                if let Some(&bad) = factors.iter().find(|&&f| !(f > 0.0 && f.is_finite())) {
                    return Err(invalid(name, bad));
                }
            }
        }

        let fbank = &self.fbank_feature_extractor;
        if fbank.num_mel_bins == 0 {
            return Err(invalid("fbank_feature_extractor.num_mel_bins", 0.0));
        }
        if fbank.dither < 0.0 || fbank.dither.is_nan() {
            return Err(invalid("fbank_feature_extractor.dither", fbank.dither as f64));
        }

        if let Some(augment) = &self.spec_augment {
            augment.validate()?;
        }

        Ok(())
    }

    /// Look up a named dataset descriptor.
    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig> {
        self.datasets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDataset(name.to_string()).into())
    }

    /// Load the normalizer named by `mean_var_norm`, if any.
    pub fn load_mean_var_norm(&self) -> Result<Option<MeanVarNormalizer>> {
        self.mean_var_norm
            .as_ref()
            .map(MeanVarNormalizer::load)
            .transpose()
    }
}

fn check_range(name: &'static str, min: f64, max: f64) -> Result<()> {
    if min > max || min.is_nan() || max.is_nan() {
        return Err(ConfigError::InvalidRange { name, min, max }.into());
    }
    Ok(())
}

fn invalid(name: &'static str, value: f64) -> crate::error::Error {
    ConfigError::InvalidValue { name, value }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::text::Case;

    const FULL: &str = r#"
sample_loader:
  min_duration: 0.5
  max_duration: 20.0
  field_map:
    text: TRANSCRIPT
resampler:
  sample_rate: 16000
perturbation:
  mark_key: true
  speeds: [0.9, 1.0, 1.1]
  volumes: [0.125, 1.0, 2.0]
fbank_feature_extractor:
  num_mel_bins: 80
  dither: 1.0
spec_augment:
  num_t_masks: 3
text_normalizer:
  case: upper
datasets:
  train:
    subsets:
      - id: clean
        max_num_samples: 100
      - id: other
"#;

    #[test]
    fn parses_full_config() {
        let config = PipelineConfig::from_yaml(FULL).unwrap();

        assert_eq!(config.sample_loader.min_duration, 0.5);
        assert_eq!(config.sample_loader.field_map.text, "TRANSCRIPT");
        assert_eq!(config.sample_loader.field_map.id, "ID");
        assert_eq!(config.resampler, Some(Resampler::new(16000)));
        assert_eq!(config.perturbation.as_ref().unwrap().tempos, Vec::<f64>::new());
        assert_eq!(config.fbank_feature_extractor, FbankExtractor::new(80, 1.0));
        let augment = config.spec_augment.as_ref().unwrap();
        assert_eq!(augment.num_t_masks, 3);
        assert_eq!(augment.t_mask_width_max, 50);
        assert_eq!(config.text_normalizer.unwrap().case, Case::Upper);
        assert!(config.tokenizer.is_none());

        let train = config.dataset("train").unwrap();
        assert_eq!(train.subsets.len(), 2);
        assert_eq!(train.subsets[1].max_num_samples, -1);
    }

    #[test]
    fn minimal_config_disables_stages() {
        let config = PipelineConfig::from_yaml("fbank_feature_extractor:\n  num_mel_bins: 40\n").unwrap();

        assert!(config.resampler.is_none());
        assert!(config.perturbation.is_none());
        assert!(config.spec_augment.is_none());
        assert!(config.load_mean_var_norm().unwrap().is_none());
        assert_eq!(config.fbank_feature_extractor.dither, 0.0);
    }

    #[test]
    fn fbank_section_is_required() {
        assert!(PipelineConfig::from_yaml("resampler:\n  sample_rate: 16000\n").is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        let yaml = "fbank_feature_extractor:\n  num_mel_bins: 40\nreverb: {}\n";

        assert!(matches!(
            PipelineConfig::from_yaml(yaml),
            Err(Error::Config(ConfigError::Yaml(_)))
        ));
    }

    #[test]
    fn rejects_inverted_duration_range() {
        let yaml = "sample_loader:\n  min_duration: 5\n  max_duration: 1\nfbank_feature_extractor:\n  num_mel_bins: 40\n";

        assert!(matches!(
            PipelineConfig::from_yaml(yaml),
            Err(Error::Config(ConfigError::InvalidRange {
                name: "duration",
                ..
            }))
        ));
    }

    #[test]
    fn rejects_non_positive_factor() {
        let yaml = "perturbation:\n  tempos: [1.0, 0.0]\nfbank_feature_extractor:\n  num_mel_bins: 40\n";

        assert!(matches!(
            PipelineConfig::from_yaml(yaml),
            Err(Error::Config(ConfigError::InvalidValue {
                name: "perturbation.tempos",
                ..
            }))
        ));
    }

    #[test]
    fn rejects_zero_mel_bins() {
        let yaml = "fbank_feature_extractor:\n  num_mel_bins: 0\n";

        assert!(PipelineConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn unknown_dataset_name() {
        let config = PipelineConfig::from_yaml("fbank_feature_extractor:\n  num_mel_bins: 40\n").unwrap();

        assert!(matches!(
            config.dataset("dev"),
            Err(Error::Config(ConfigError::UnknownDataset(_)))
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        assert!(matches!(
            PipelineConfig::from_file("/nonexistent/config.yaml"),
            Err(Error::Config(ConfigError::FileNotFound(_)))
        ));
    }

    #[test]
    fn loads_referenced_normalizer() {
        let dir = tempfile::tempdir().unwrap();
        let norm_path = dir.path().join("norm.txt");
        std::fs::write(&norm_path, "2\n-1 -2\n0.5 0.25\n").unwrap();
        let yaml = format!(
            "fbank_feature_extractor:\n  num_mel_bins: 2\nmean_var_norm: {}\n",
            norm_path.display()
        );

        let config = PipelineConfig::from_yaml(&yaml).unwrap();
        let norm = config.load_mean_var_norm().unwrap().unwrap();

        assert_eq!(norm.dim(), 2);
    }
}
