//! Per-batch sample processing and padding.

use crate::audio::load_audio;
use crate::config::PipelineConfig;
use crate::error::{FeatureError, Result};
use crate::mvn::MeanVarNormalizer;
use crate::sample::Sample;
use crate::stage::{
    FeatureAugment, FeatureExtract, FeatureNormalize, Passthrough, TextTokenize, TextTransform,
    WaveformPerturb, WaveformResample,
};
use crate::tokenizer::Tokenizer;
use ndarray::{Array2, Array3, s};
use rand::RngCore;

/// Pad value for feature frames beyond a sample's length.
pub const FEATURE_PADDING_VALUE: f32 = 0.0;

/// Pad value for target positions beyond a sample's token count; never a
/// valid token id.
pub const LABEL_PADDING_VALUE: i64 = -1;

/// One sample after every enabled stage has run.
#[derive(Clone, Debug)]
pub struct ProcessedSample {
    /// Sample id with any perturbation or augmentation tags appended
    pub key: String,
    pub waveform: Vec<f32>,
    pub sample_rate: u32,
    /// (frames, dim)
    pub feature: Array2<f32>,
    pub text: String,
    pub token_pieces: Vec<String>,
    pub token_ids: Vec<u32>,
}

/// Padded batch tensors with their unpadded lengths.
#[derive(Clone, Debug)]
pub struct Batch {
    pub samples: Vec<ProcessedSample>,
    pub num_utts: usize,
    /// Sum of unpadded frame counts
    pub num_frames: usize,
    /// (batch, max frames, dim)
    pub inputs: Array3<f32>,
    pub input_lengths: Vec<usize>,
    /// (batch, max tokens)
    pub targets: Array2<i64>,
    pub target_lengths: Vec<usize>,
}

/// Stage chain applied to every sample of a batch.
///
/// Order is fixed: load → resample → perturb → extract → normalize → augment
/// on the audio side, then text transform → tokenize.
pub struct DataPipe {
    resampler: Box<dyn WaveformResample>,
    perturbation: Box<dyn WaveformPerturb>,
    feature_extractor: Box<dyn FeatureExtract>,
    mean_var_norm: Box<dyn FeatureNormalize>,
    spec_augment: Box<dyn FeatureAugment>,
    text_normalizer: Box<dyn TextTransform>,
    tokenizer: Box<dyn TextTokenize>,
}

impl Default for DataPipe {
    fn default() -> Self {
        Self {
            resampler: Box::new(Passthrough),
            perturbation: Box::new(Passthrough),
            feature_extractor: Box::new(Passthrough),
            mean_var_norm: Box::new(Passthrough),
            spec_augment: Box::new(Passthrough),
            text_normalizer: Box::new(Passthrough),
            tokenizer: Box::new(Passthrough),
        }
    }
}

impl DataPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full training pipe from config.
    ///
    /// Loads the tokenizer files named by the config. The normalizer is
    /// passed in since it comes from a separate stats pass.
    pub fn from_config(config: &PipelineConfig, mean_var_norm: Option<MeanVarNormalizer>) -> Result<Self> {
        let mut pipe = Self::features_from_config(config);

        if let Some(norm) = mean_var_norm {
            pipe = pipe.with_mean_var_norm(norm);
        }
        if let Some(augment) = &config.spec_augment {
            pipe = pipe.with_spec_augment(augment.clone());
        }
        if let Some(text_normalizer) = config.text_normalizer {
            pipe = pipe.with_text_normalizer(text_normalizer);
        }
        if let Some(tokenizer) = &config.tokenizer {
            pipe = pipe.with_tokenizer(Tokenizer::from_config(tokenizer)?);
        }

        Ok(pipe)
    }

    /// Build the pipe used for the statistics pass: resample, perturb and
    /// extract only.
    pub fn features_from_config(config: &PipelineConfig) -> Self {
        let mut pipe = Self::new().with_feature_extractor(config.fbank_feature_extractor.clone());

        if let Some(resampler) = config.resampler {
            pipe = pipe.with_resampler(resampler);
        }
        if let Some(perturbation) = &config.perturbation {
            pipe = pipe.with_perturbation(perturbation.clone());
        }

        pipe
    }

    pub fn with_resampler(mut self, stage: impl WaveformResample + 'static) -> Self {
        self.resampler = Box::new(stage);
        self
    }

    pub fn with_perturbation(mut self, stage: impl WaveformPerturb + 'static) -> Self {
        self.perturbation = Box::new(stage);
        self
    }

    pub fn with_feature_extractor(mut self, stage: impl FeatureExtract + 'static) -> Self {
        self.feature_extractor = Box::new(stage);
        self
    }

    pub fn with_mean_var_norm(mut self, stage: impl FeatureNormalize + 'static) -> Self {
        self.mean_var_norm = Box::new(stage);
        self
    }

    pub fn with_spec_augment(mut self, stage: impl FeatureAugment + 'static) -> Self {
        self.spec_augment = Box::new(stage);
        self
    }

    pub fn with_text_normalizer(mut self, stage: impl TextTransform + 'static) -> Self {
        self.text_normalizer = Box::new(stage);
        self
    }

    pub fn with_tokenizer(mut self, stage: impl TextTokenize + 'static) -> Self {
        self.tokenizer = Box::new(stage);
        self
    }

    /// Names of the enabled stages in execution order.
    pub fn stages(&self) -> Vec<&'static str> {
        [
            self.resampler.name(),
            self.perturbation.name(),
            self.feature_extractor.name(),
            self.mean_var_norm.name(),
            self.spec_augment.name(),
            self.text_normalizer.name(),
            self.tokenizer.name(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Process and collate a batch.
    ///
    /// Each sample's `duration` is corrected in place to what was actually
    /// decoded.
    ///
    /// # Errors
    ///
    /// Returns error if any stage fails or feature dimensions disagree.
    pub fn process(&self, samples: &mut [Sample], rng: &mut dyn RngCore) -> Result<Batch> {
        let processed = samples
            .iter_mut()
            .map(|sample| self.process_sample(sample, rng))
            .collect::<Result<Vec<_>>>()?;

        collate(processed)
    }

    fn process_sample(&self, sample: &mut Sample, rng: &mut dyn RngCore) -> Result<ProcessedSample> {
        let mut key = sample.id.clone();

        let audio = load_audio(&sample.audio, sample.begin, sample.duration)?;
        sample.duration = audio.duration;

        let (waveform, sample_rate) = self.resampler.resample(audio.waveform, audio.sample_rate)?;
        let waveform = self.perturbation.perturb(&mut key, waveform, sample_rate, rng)?;

        let mut feature = self.feature_extractor.extract(&waveform, sample_rate, rng)?;
        self.mean_var_norm.normalize(feature.view_mut())?;
        self.spec_augment.augment(&mut key, feature.view_mut(), rng);

        let text = self.text_normalizer.transform(&sample.text);
        let (token_pieces, token_ids) = self.tokenizer.tokenize(&text)?;

        tracing::trace!(
            id = %sample.id,
            %key,
            frames = feature.nrows(),
            tokens = token_ids.len(),
            "processed sample"
        );

        Ok(ProcessedSample {
            key,
            waveform,
            sample_rate,
            feature,
            text,
            token_pieces,
            token_ids,
        })
    }
}

impl std::fmt::Debug for DataPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPipe")
            .field("stages", &self.stages())
            .finish()
    }
}

/// Pad features and token ids to the batch maxima.
///
/// # Errors
///
/// Returns [`FeatureError::DimensionMismatch`] if feature widths differ.
pub fn collate(samples: Vec<ProcessedSample>) -> Result<Batch> {
    let num_utts = samples.len();

    let dim = samples.first().map_or(0, |s| s.feature.ncols());
    if let Some(bad) = samples.iter().find(|s| s.feature.ncols() != dim) {
        return Err(FeatureError::DimensionMismatch {
            expected: dim,
            got: bad.feature.ncols(),
        }
        .into());
    }

    let input_lengths: Vec<usize> = samples.iter().map(|s| s.feature.nrows()).collect();
    let target_lengths: Vec<usize> = samples.iter().map(|s| s.token_ids.len()).collect();
    let max_frames = input_lengths.iter().copied().max().unwrap_or(0);
    let max_tokens = target_lengths.iter().copied().max().unwrap_or(0);

    let mut inputs = Array3::from_elem((num_utts, max_frames, dim), FEATURE_PADDING_VALUE);
    let mut targets = Array2::from_elem((num_utts, max_tokens), LABEL_PADDING_VALUE);

    for (i, sample) in samples.iter().enumerate() {
        let frames = sample.feature.nrows();
        inputs.slice_mut(s![i, ..frames, ..]).assign(&sample.feature);

        for (dst, &id) in targets.row_mut(i).iter_mut().zip(&sample.token_ids) {
            *dst = id as i64;
        }
    }

    let num_frames = input_lengths.iter().sum();

    Ok(Batch {
        samples,
        num_utts,
        num_frames,
        inputs,
        input_lengths,
        targets,
        target_lengths,
    })
}
