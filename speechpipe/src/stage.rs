//! Pipeline stage traits.
//!
//! Each position in the [`DataPipe`](crate::pipe::DataPipe) chain is a trait.
//! A disabled position holds [`Passthrough`], which implements every stage as
//! a no-op, so the pipe never branches on whether a stage is present.

use crate::error::Result;
use crate::fbank::FbankExtractor;
use crate::mvn::MeanVarNormalizer;
use crate::perturb::Perturbation;
use crate::resample::Resampler;
use crate::spec_augment::SpecAugment;
use crate::text::TextNormalizer;
use crate::tokenizer::Tokenizer;
use ndarray::{Array2, ArrayViewMut2};
use rand::RngCore;

/// Converts a waveform to the pipeline sample rate.
pub trait WaveformResample: Send + Sync {
    fn resample(&self, waveform: Vec<f32>, sample_rate: u32) -> Result<(Vec<f32>, u32)>;

    /// Stage name for logging, `None` when disabled.
    fn name(&self) -> Option<&'static str> {
        Some("resampler")
    }
}

/// Randomly alters a waveform, optionally tagging the sample key.
pub trait WaveformPerturb: Send + Sync {
    fn perturb(
        &self,
        key: &mut String,
        waveform: Vec<f32>,
        sample_rate: u32,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f32>>;

    fn name(&self) -> Option<&'static str> {
        Some("perturbation")
    }
}

/// Computes a (frames, dim) feature matrix from a waveform.
pub trait FeatureExtract: Send + Sync {
    fn extract(&self, waveform: &[f32], sample_rate: u32, rng: &mut dyn RngCore) -> Result<Array2<f32>>;

    fn name(&self) -> Option<&'static str> {
        Some("feature_extractor")
    }
}

/// Normalizes a feature matrix in place.
pub trait FeatureNormalize: Send + Sync {
    fn normalize(&self, feature: ArrayViewMut2<f32>) -> Result<()>;

    fn name(&self) -> Option<&'static str> {
        Some("mean_var_norm")
    }
}

/// Randomly masks a feature matrix in place.
pub trait FeatureAugment: Send + Sync {
    fn augment(&self, key: &mut String, feature: ArrayViewMut2<f32>, rng: &mut dyn RngCore);

    fn name(&self) -> Option<&'static str> {
        Some("spec_augment")
    }
}

/// Rewrites transcript text.
pub trait TextTransform: Send + Sync {
    fn transform(&self, text: &str) -> String;

    fn name(&self) -> Option<&'static str> {
        Some("text_normalizer")
    }
}

/// Splits text into token pieces and ids.
pub trait TextTokenize: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<(Vec<String>, Vec<u32>)>;

    fn name(&self) -> Option<&'static str> {
        Some("tokenizer")
    }
}

/// Disabled stage.
///
/// Passes waveforms and text through unchanged, yields a `[0, 0]` feature
/// matrix and no tokens.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl WaveformResample for Passthrough {
    fn resample(&self, waveform: Vec<f32>, sample_rate: u32) -> Result<(Vec<f32>, u32)> {
        Ok((waveform, sample_rate))
    }

    fn name(&self) -> Option<&'static str> {
        None
    }
}

impl WaveformPerturb for Passthrough {
    fn perturb(
        &self,
        _key: &mut String,
        waveform: Vec<f32>,
        _sample_rate: u32,
        _rng: &mut dyn RngCore,
    ) -> Result<Vec<f32>> {
        Ok(waveform)
    }

    fn name(&self) -> Option<&'static str> {
        None
    }
}

impl FeatureExtract for Passthrough {
    fn extract(&self, _waveform: &[f32], _sample_rate: u32, _rng: &mut dyn RngCore) -> Result<Array2<f32>> {
        Ok(Array2::zeros((0, 0)))
    }

    fn name(&self) -> Option<&'static str> {
        None
    }
}

impl FeatureNormalize for Passthrough {
    fn normalize(&self, _feature: ArrayViewMut2<f32>) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> Option<&'static str> {
        None
    }
}

impl FeatureAugment for Passthrough {
    fn augment(&self, _key: &mut String, _feature: ArrayViewMut2<f32>, _rng: &mut dyn RngCore) {}

    fn name(&self) -> Option<&'static str> {
        None
    }
}

impl TextTransform for Passthrough {
    fn transform(&self, text: &str) -> String {
        text.to_string()
    }

    fn name(&self) -> Option<&'static str> {
        None
    }
}

impl TextTokenize for Passthrough {
    fn tokenize(&self, _text: &str) -> Result<(Vec<String>, Vec<u32>)> {
        Ok((Vec::new(), Vec::new()))
    }

    fn name(&self) -> Option<&'static str> {
        None
    }
}

// Concrete stages

impl WaveformResample for Resampler {
    fn resample(&self, waveform: Vec<f32>, sample_rate: u32) -> Result<(Vec<f32>, u32)> {
        self.apply(waveform, sample_rate)
    }
}

impl WaveformPerturb for Perturbation {
    fn perturb(
        &self,
        key: &mut String,
        waveform: Vec<f32>,
        sample_rate: u32,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f32>> {
        self.apply(key, waveform, sample_rate, rng)
    }
}

impl FeatureExtract for FbankExtractor {
    fn extract(&self, waveform: &[f32], sample_rate: u32, rng: &mut dyn RngCore) -> Result<Array2<f32>> {
        Ok(self.apply(waveform, sample_rate, rng))
    }
}

impl FeatureNormalize for MeanVarNormalizer {
    fn normalize(&self, feature: ArrayViewMut2<f32>) -> Result<()> {
        self.apply(feature)
    }
}

impl FeatureAugment for SpecAugment {
    fn augment(&self, key: &mut String, feature: ArrayViewMut2<f32>, rng: &mut dyn RngCore) {
        self.apply(key, feature, rng)
    }
}

impl TextTransform for TextNormalizer {
    fn transform(&self, text: &str) -> String {
        self.apply(text)
    }
}

impl TextTokenize for Tokenizer {
    fn tokenize(&self, text: &str) -> Result<(Vec<String>, Vec<u32>)> {
        Tokenizer::tokenize(self, text)
    }
}
