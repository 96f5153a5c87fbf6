//! Subword tokenizer with an id-ordered vocabulary table.

use crate::error::{ConfigError, Result, TokenizerError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use sentencepiece::SentencePieceProcessor;

/// Ordered distinct tokens; a token's position is its id.
#[derive(Clone, Debug, Default)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Build from tokens in id order.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerError::DuplicateToken`] if a token repeats.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::default();
        for (line, token) in tokens.into_iter().enumerate() {
            vocab.push(token.into(), line + 1)?;
        }
        Ok(vocab)
    }

    /// Load a vocabulary file: one token per line, first whitespace-separated
    /// column is the token. Blank lines are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()).into(),
            _ => crate::error::Error::from(TokenizerError::from(e)),
        })?;

        let mut vocab = Self::default();
        for (i, line) in content.lines().enumerate() {
            if let Some(token) = line.split_whitespace().next() {
                vocab.push(token.to_string(), i + 1)?;
            }
        }

        tracing::debug!(?path, size = vocab.size(), "vocabulary loaded");

        Ok(vocab)
    }

    fn push(&mut self, token: String, line: usize) -> Result<()> {
        if self.index.contains_key(&token) {
            return Err(TokenizerError::DuplicateToken { token, line }.into());
        }
        self.index.insert(token.clone(), self.tokens.len());
        self.tokens.push(token);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    pub fn id(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn token(&self, id: usize) -> Option<&str> {
        self.tokens.get(id).map(String::as_str)
    }
}

/// Output representation for [`Tokenizer::encode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodeMode {
    Id,
    Piece,
}

impl FromStr for EncodeMode {
    type Err = TokenizerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "piece" => Ok(Self::Piece),
            _ => Err(TokenizerError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for EncodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => write!(f, "id"),
            Self::Piece => write!(f, "piece"),
        }
    }
}

/// Encoded text in the requested representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoded {
    Ids(Vec<u32>),
    Pieces(Vec<String>),
}

/// Tokenizer settings from the pipeline config.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TokenizerConfig {
    /// Subword model: a SentencePiece `.model` file, otherwise `tokenizers` JSON
    pub model: PathBuf,
    pub vocab: PathBuf,
    #[serde(default = "default_blank")]
    pub blank: String,
    #[serde(default = "default_bos")]
    pub bos: String,
    #[serde(default = "default_eos")]
    pub eos: String,
    #[serde(default = "default_unk")]
    pub unk: String,
    #[serde(default = "default_sil")]
    pub sil: String,
}

fn default_blank() -> String {
    "<blk>".to_string()
}

fn default_bos() -> String {
    "<s>".to_string()
}

fn default_eos() -> String {
    "</s>".to_string()
}

fn default_unk() -> String {
    "<unk>".to_string()
}

fn default_sil() -> String {
    "<sil>".to_string()
}

impl TokenizerConfig {
    pub fn new(model: impl Into<PathBuf>, vocab: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            vocab: vocab.into(),
            blank: default_blank(),
            bos: default_bos(),
            eos: default_eos(),
            unk: default_unk(),
            sil: default_sil(),
        }
    }
}

/// Resolved ids of the reserved tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialIds {
    pub blank: usize,
    pub bos: usize,
    pub eos: usize,
    /// Falls back to `blank` when absent
    pub unk: usize,
    /// Falls back to `unk` when absent
    pub sil: usize,
}

/// Subword segmentation backend.
pub enum SubwordModel {
    /// `tokenizers` JSON pipeline
    Json(Box<tokenizers::Tokenizer>),
    /// Serialized SentencePiece `ModelProto`
    SentencePiece(SentencePieceProcessor),
}

impl SubwordModel {
    /// Load `path`, picking the backend from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()).into());
        }

        let model = match path.extension().and_then(|e| e.to_str()) {
            Some("model") => Self::SentencePiece(SentencePieceProcessor::open(path)?),
            _ => Self::Json(Box::new(tokenizers::Tokenizer::from_file(path)?)),
        };

        tracing::debug!(
            ?path,
            backend = model.backend(),
            size = model.size(),
            "subword model loaded"
        );

        Ok(model)
    }

    fn backend(&self) -> &'static str {
        match self {
            Self::Json(_) => "tokenizers",
            Self::SentencePiece(_) => "sentencepiece",
        }
    }

    /// Number of pieces the model can emit.
    pub fn size(&self) -> usize {
        match self {
            Self::Json(model) => model.get_vocab_size(true),
            Self::SentencePiece(model) => model.len(),
        }
    }

    fn encode(&self, text: &str) -> Result<(Vec<String>, Vec<u32>)> {
        match self {
            Self::Json(model) => {
                let encoding = model.encode(text, false)?;
                Ok((encoding.get_tokens().to_vec(), encoding.get_ids().to_vec()))
            }
            Self::SentencePiece(model) => Ok(model
                .encode(text)?
                .into_iter()
                .map(|p| (p.piece, p.id))
                .unzip()),
        }
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        match self {
            Self::Json(model) => Ok(model.decode(ids, false)?),
            Self::SentencePiece(model) => Ok(model.decode_piece_ids(ids)?),
        }
    }
}

/// Subword model plus vocabulary table.
pub struct Tokenizer {
    model: SubwordModel,
    vocab: Vocabulary,
    special: SpecialIds,
}

impl Tokenizer {
    /// Load the subword model and vocabulary named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerError::MissingSpecialToken`] if blank, bos or eos is
    /// absent from the vocabulary.
    pub fn from_config(config: &TokenizerConfig) -> Result<Self> {
        let model = SubwordModel::from_file(&config.model)?;
        let vocab = Vocabulary::load(&config.vocab)?;

        Self::new(model, vocab, config)
    }

    /// Assemble from an already loaded model and vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerError::VocabSizeMismatch`] if the vocabulary and the
    /// model disagree on the number of tokens.
    pub fn new(model: SubwordModel, vocab: Vocabulary, config: &TokenizerConfig) -> Result<Self> {
        if vocab.size() != model.size() {
            return Err(TokenizerError::VocabSizeMismatch {
                vocab: vocab.size(),
                model: model.size(),
            }
            .into());
        }

        let require = |token: &str| {
            vocab
                .id(token)
                .ok_or_else(|| TokenizerError::MissingSpecialToken(token.to_string()))
        };

        let blank = require(&config.blank)?;
        let bos = require(&config.bos)?;
        let eos = require(&config.eos)?;
        let unk = vocab.id(&config.unk).unwrap_or(blank);
        let sil = vocab.id(&config.sil).unwrap_or(unk);

        let special = SpecialIds {
            blank,
            bos,
            eos,
            unk,
            sil,
        };

        tracing::debug!(size = vocab.size(), ?special, "tokenizer ready");

        Ok(Self {
            model,
            vocab,
            special,
        })
    }

    /// Encode `text` as ids or pieces.
    pub fn encode(&self, text: &str, mode: EncodeMode) -> Result<Encoded> {
        let (pieces, ids) = self.model.encode(text)?;
        Ok(match mode {
            EncodeMode::Id => Encoded::Ids(ids),
            EncodeMode::Piece => Encoded::Pieces(pieces),
        })
    }

    /// Encode once, returning both pieces and ids.
    pub fn tokenize(&self, text: &str) -> Result<(Vec<String>, Vec<u32>)> {
        self.model.encode(text)
    }

    /// Reconstruct text using the model's decoder.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.model.decode(ids)
    }

    /// Vocabulary cardinality.
    pub fn size(&self) -> usize {
        self.vocab.size()
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn special_ids(&self) -> SpecialIds {
        self.special
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("size", &self.vocab.size())
            .field("special", &self.special)
            .finish_non_exhaustive()
    }
}
