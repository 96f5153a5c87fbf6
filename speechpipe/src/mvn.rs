//! Global mean/variance statistics and the normalizer derived from them.

use crate::error::{ConfigError, FeatureError, Result};
use ndarray::{Array1, ArrayView2, ArrayViewMut2, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Running first and second order sums over feature frames.
///
/// Feature dimension is fixed by the first accumulated matrix.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanVarStats {
    pub o1_sum: Vec<f64>,
    pub o2_sum: Vec<f64>,
    pub n: u64,
}

impl MeanVarStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feature dimension, or `None` before the first accumulation.
    pub fn dim(&self) -> Option<usize> {
        (self.n > 0 || !self.o1_sum.is_empty()).then_some(self.o1_sum.len())
    }

    /// Add per-column sums and sums of squares of `feature` (frames, dim).
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::DimensionMismatch`] if the column count differs
    /// from the established dimension.
    pub fn accumulate(&mut self, feature: ArrayView2<f32>) -> Result<()> {
        let (num_frames, dim) = feature.dim();

        match self.dim() {
            None => {
                self.o1_sum = vec![0.0; dim];
                self.o2_sum = vec![0.0; dim];
            }
            Some(expected) if expected != dim => {
                return Err(FeatureError::DimensionMismatch { expected, got: dim }.into());
            }
            Some(_) => {}
        }

        for row in feature.rows() {
            for ((s1, s2), &x) in self.o1_sum.iter_mut().zip(&mut self.o2_sum).zip(row) {
                let x = x as f64;
                *s1 += x;
                *s2 += x * x;
            }
        }
        self.n += num_frames as u64;

        Ok(())
    }

    /// Fold partial statistics from another accumulator into this one.
    pub fn merge(&mut self, other: &MeanVarStats) -> Result<()> {
        let Some(dim) = other.dim() else {
            return Ok(());
        };

        match self.dim() {
            None => {
                *self = other.clone();
                return Ok(());
            }
            Some(expected) if expected != dim => {
                return Err(FeatureError::DimensionMismatch { expected, got: dim }.into());
            }
            Some(_) => {}
        }

        for (a, b) in self.o1_sum.iter_mut().zip(&other.o1_sum) {
            *a += b;
        }
        for (a, b) in self.o2_sum.iter_mut().zip(&other.o2_sum) {
            *a += b;
        }
        self.n += other.n;

        Ok(())
    }

    /// Load statistics from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(?path, "loading mean/var stats");

        let file = open(path)?;
        let stats: MeanVarStats = serde_json::from_reader(BufReader::new(file))?;

        if stats.o1_sum.len() != stats.o2_sum.len() {
            return Err(FeatureError::DimensionMismatch {
                expected: stats.o1_sum.len(),
                got: stats.o2_sum.len(),
            }
            .into());
        }

        Ok(stats)
    }

    /// Write statistics as pretty-printed JSON.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tracing::info!(?path, frames = self.n, "dumping mean/var stats");

        let file = File::create(path).map_err(FeatureError::from)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n").map_err(FeatureError::from)?;
        writer.flush().map_err(FeatureError::from)?;

        Ok(())
    }
}

/// Per-dimension affine transform `(x + shift) * scale`.
#[derive(Clone, Debug, PartialEq)]
pub struct MeanVarNormalizer {
    pub shift: Array1<f32>,
    pub scale: Array1<f32>,
}

impl MeanVarNormalizer {
    /// Derive `shift = -mean` and `scale = 1 / max(std, f32::EPSILON)`.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::EmptyStats`] if no frames were accumulated.
    pub fn from_stats(stats: &MeanVarStats) -> Result<Self> {
        if stats.n == 0 || stats.o1_sum.is_empty() {
            return Err(FeatureError::EmptyStats.into());
        }

        let n = stats.n as f64;
        let eps = f32::EPSILON as f64;

        let (shift, scale): (Vec<f32>, Vec<f32>) = stats
            .o1_sum
            .iter()
            .zip(&stats.o2_sum)
            .map(|(&s1, &s2)| {
                let mean = s1 / n;
                let var = (s2 / n - mean * mean).max(0.0);
                (-mean as f32, (1.0 / var.sqrt().max(eps)) as f32)
            })
            .unzip();

        Ok(Self {
            shift: Array1::from(shift),
            scale: Array1::from(scale),
        })
    }

    pub fn dim(&self) -> usize {
        self.shift.len()
    }

    /// Normalize `feature` (frames, dim) in place.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::DimensionMismatch`] if the column count differs
    /// from the normalizer dimension.
    pub fn apply(&self, mut feature: ArrayViewMut2<f32>) -> Result<()> {
        let dim = feature.len_of(Axis(1));
        if dim != self.dim() {
            return Err(FeatureError::DimensionMismatch {
                expected: self.dim(),
                got: dim,
            }
            .into());
        }

        for mut row in feature.rows_mut() {
            row += &self.shift;
            row *= &self.scale;
        }

        Ok(())
    }

    /// Load the plain-text form: dimension, shift row, scale row.
    ///
    /// Values may be separated by spaces, tabs or commas.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(?path, "loading mean/var normalizer");

        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()).into(),
            _ => crate::error::Error::from(FeatureError::from(e)),
        })?;

        let malformed = |reason: String| FeatureError::MalformedNormalizer {
            path: path.to_path_buf(),
            reason,
        };

        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() != 3 {
            return Err(malformed(format!("expected 3 lines, got {}", lines.len())).into());
        }

        let dim: usize = lines[0]
            .parse()
            .map_err(|_| malformed(format!("invalid dimension {:?}", lines[0])))?;

        let parse_row = |line: &str, name: &str| -> std::result::Result<Array1<f32>, FeatureError> {
            let values = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<f32>()
                        .map_err(|_| malformed(format!("invalid {name} value {s:?}")))
                })
                .collect::<std::result::Result<Vec<f32>, _>>()?;
            if values.len() != dim {
                return Err(malformed(format!(
                    "{name} has {} values, expected {dim}",
                    values.len()
                )));
            }
            Ok(Array1::from(values))
        };

        let shift = parse_row(lines[1], "shift")?;
        let scale = parse_row(lines[2], "scale")?;

        Ok(Self { shift, scale })
    }

    /// Write the plain-text form.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tracing::info!(?path, dim = self.dim(), "dumping mean/var normalizer");

        let join = |values: &Array1<f32>| {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };

        let content = format!(
            "{}\n{}\n{}\n",
            self.dim(),
            join(&self.shift),
            join(&self.scale)
        );
        std::fs::write(path, content).map_err(FeatureError::from)?;

        Ok(())
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::FileNotFound(PathBuf::from(path)).into(),
        _ => FeatureError::from(e).into(),
    })
}
