//! Error types for speechpipe organized by processing stage.

use ndarray::ShapeError;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration stage error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Dataset construction error
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Audio loading, resampling and perturbation error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Feature extraction, statistics and normalization error
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Vocabulary and subword model error
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
}

/// Configuration errors (config files, subset registry, stage parameters).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required file is missing
    #[error("file not found: {0:?}")]
    FileNotFound(PathBuf),

    /// Dataset descriptor references a subset absent from the registry
    #[error("unknown subset: {0}")]
    UnknownSubset(String),

    /// Named dataset is absent from the pipeline config
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    /// Lower bound exceeds upper bound
    #[error("invalid range for {name}: min {min} > max {max}")]
    InvalidRange { name: &'static str, min: f64, max: f64 },

    /// Parameter outside its valid domain
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: f64 },

    /// Invalid shard selection
    #[error("invalid shard {index} of {count}")]
    InvalidShard { index: usize, count: usize },

    /// YAML parse error
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Dataset construction errors.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Metadata format other than tab-separated values
    #[error("metadata format not implemented: {0:?}")]
    Unsupported(PathBuf),

    /// Numeric field failed to parse
    #[error("invalid {field} value {value:?}")]
    InvalidField { field: String, value: String },

    /// Metadata row rejected by the sample loader
    #[error("{path:?} line {line}: {source}")]
    InvalidRow {
        path: PathBuf,
        line: u64,
        #[source]
        source: Box<DatasetError>,
    },

    /// TSV reader error
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// IO error while reading metadata
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Audio loading and waveform transform errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Sample rate must be non-zero
    #[error("invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Channel count validation failed
    #[error("invalid channel count: {0}")]
    InvalidChannels(u16),

    /// IO error during audio loading
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),

    /// Resampler construction error
    #[error(transparent)]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Resampler processing error
    #[error(transparent)]
    Resample(#[from] rubato::ResampleError),
}

/// Feature matrix, statistics and normalizer errors.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Feature dimension differs from the established one
    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Statistics have no frames to derive a normalizer from
    #[error("mean/var stats are empty")]
    EmptyStats,

    /// Plain-text normalizer file is malformed
    #[error("malformed mean/var normalizer {path:?}: {reason}")]
    MalformedNormalizer { path: PathBuf, reason: String },

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// Stats JSON error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// IO error while reading or writing stats
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tokenizer and vocabulary errors.
#[derive(Debug, Error)]
pub enum TokenizerError {
    /// Mandatory special token absent from the vocabulary
    #[error("special token {0:?} not found in vocabulary")]
    MissingSpecialToken(String),

    /// Token listed twice in the vocabulary file
    #[error("duplicate token {token:?} at line {line}")]
    DuplicateToken { token: String, line: usize },

    /// Vocabulary file and subword model list a different number of tokens
    #[error("vocabulary has {vocab} tokens but the subword model has {model}")]
    VocabSizeMismatch { vocab: usize, model: usize },

    /// Encode mode other than "id" or "piece"
    #[error("unknown encode mode: {0:?}")]
    UnknownMode(String),

    /// IO error while reading the vocabulary
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Subword model error
    #[error("tokenizers: {0}")]
    Tokenizers(tokenizers::Error),

    /// SentencePiece model error
    #[error(transparent)]
    SentencePiece(#[from] sentencepiece::SentencePieceError),
}

/// Result type alias for speechpipe operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}

// rubato errors → AudioError → Error
impl From<rubato::ResamplerConstructionError> for Error {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        Error::Audio(AudioError::ResamplerConstruction(e))
    }
}

impl From<rubato::ResampleError> for Error {
    fn from(e: rubato::ResampleError) -> Self {
        Error::Audio(AudioError::Resample(e))
    }
}

// csv::Error → DatasetError → Error
impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Dataset(DatasetError::Csv(e))
    }
}

// serde_yaml::Error → ConfigError → Error
impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(ConfigError::Yaml(e))
    }
}

// serde_json::Error → FeatureError → Error
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Feature(FeatureError::Json(e))
    }
}

// ShapeError → FeatureError → Error
impl From<ShapeError> for Error {
    fn from(e: ShapeError) -> Self {
        Error::Feature(FeatureError::Shape(e))
    }
}

// tokenizers::Error → TokenizerError → Error
impl From<tokenizers::Error> for TokenizerError {
    fn from(e: tokenizers::Error) -> Self {
        TokenizerError::Tokenizers(e)
    }
}

impl From<tokenizers::Error> for Error {
    fn from(e: tokenizers::Error) -> Self {
        Error::Tokenizer(TokenizerError::Tokenizers(e))
    }
}

// sentencepiece::SentencePieceError → TokenizerError → Error
impl From<sentencepiece::SentencePieceError> for Error {
    fn from(e: sentencepiece::SentencePieceError) -> Self {
        Error::Tokenizer(TokenizerError::SentencePiece(e))
    }
}
