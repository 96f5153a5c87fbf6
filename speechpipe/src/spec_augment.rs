//! SpecAugment time and frequency masking.

use crate::error::{ConfigError, Result};
use ndarray::{ArrayViewMut2, s};
use rand::{Rng, RngCore};
use serde::Deserialize;

/// Zeroes random time and frequency bands of a feature matrix.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SpecAugment {
    /// Append `__SpecAugment` to the sample key
    pub mark_key: bool,
    pub num_t_masks: usize,
    pub t_mask_width_min: usize,
    pub t_mask_width_max: usize,
    pub num_f_masks: usize,
    pub f_mask_width_min: usize,
    pub f_mask_width_max: usize,
}

impl Default for SpecAugment {
    fn default() -> Self {
        Self {
            mark_key: false,
            num_t_masks: 2,
            t_mask_width_min: 1,
            t_mask_width_max: 50,
            num_f_masks: 2,
            f_mask_width_min: 1,
            f_mask_width_max: 10,
        }
    }
}

impl SpecAugment {
    /// Check that each width range is ordered.
    pub fn validate(&self) -> Result<()> {
        for (name, min, max) in [
            ("t_mask_width", self.t_mask_width_min, self.t_mask_width_max),
            ("f_mask_width", self.f_mask_width_min, self.f_mask_width_max),
        ] {
            if min > max {
                return Err(ConfigError::InvalidRange {
                    name,
                    min: min as f64,
                    max: max as f64,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Mask `feature` (frames, bins) in place.
    ///
    /// Each mask starts uniformly in `[0, len)` of its axis and is clipped at
    /// the matrix edge. Masking along an empty axis is skipped.
    pub fn apply(&self, key: &mut String, mut feature: ArrayViewMut2<f32>, rng: &mut dyn RngCore) {
        let (num_frames, num_bins) = feature.dim();

        if num_frames > 0 {
            for _ in 0..self.num_t_masks {
                let (start, end) = mask_window(
                    num_frames,
                    self.t_mask_width_min,
                    self.t_mask_width_max,
                    rng,
                );
                feature.slice_mut(s![start..end, ..]).fill(0.0);
            }
        }

        if num_bins > 0 {
            for _ in 0..self.num_f_masks {
                let (start, end) = mask_window(
                    num_bins,
                    self.f_mask_width_min,
                    self.f_mask_width_max,
                    rng,
                );
                feature.slice_mut(s![.., start..end]).fill(0.0);
            }
        }

        if self.mark_key {
            key.push_str("__SpecAugment");
        }
    }
}

/// Draw `[start, end)` with `start < len`, clipped so `end <= len`.
fn mask_window(len: usize, min_width: usize, max_width: usize, rng: &mut dyn RngCore) -> (usize, usize) {
    let start = rng.gen_range(0..len);
    let width = rng.gen_range(min_width..=max_width.max(min_width));
    (start, start.saturating_add(width).min(len))
}
