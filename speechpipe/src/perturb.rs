//! Randomized speed, tempo and volume perturbation.

use crate::error::Result;
use crate::resample::resample;
use rand::RngCore;
use rand::seq::SliceRandom;
use serde::Deserialize;

/// Randomly applies one factor each from the speed, tempo and volume lists.
///
/// A category is skipped when its list is empty, and for a single call when
/// the drawn factor is 1.0.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Perturbation {
    /// Append `__speed{f}`, `__tempo{f}`, `__vol{f}` to the sample key
    pub mark_key: bool,
    pub speeds: Vec<f64>,
    pub tempos: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl Perturbation {
    /// Apply the perturbation chain speed → tempo → volume.
    ///
    /// Speed and tempo change the nominal sample rate of the waveform; each is
    /// immediately followed by a resample back to `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns error if resampling fails.
    pub fn apply(
        &self,
        key: &mut String,
        waveform: Vec<f32>,
        sample_rate: u32,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f32>> {
        let mut waveform = waveform;

        if let Some(factor) = draw(&self.speeds, rng) {
            let (changed, nominal_rate) = change_speed(waveform, sample_rate, factor);
            waveform = rate_back(changed, nominal_rate, sample_rate)?;
            if self.mark_key {
                key.push_str(&format!("__speed{factor:?}"));
            }
        }

        if let Some(factor) = draw(&self.tempos, rng) {
            let (changed, nominal_rate) = change_tempo(&waveform, sample_rate, factor);
            waveform = rate_back(changed, nominal_rate, sample_rate)?;
            if self.mark_key {
                key.push_str(&format!("__tempo{factor:?}"));
            }
        }

        if let Some(factor) = draw(&self.volumes, rng) {
            change_volume(&mut waveform, factor);
            if self.mark_key {
                key.push_str(&format!("__vol{factor:?}"));
            }
        }

        Ok(waveform)
    }
}

/// Pick a factor, or `None` when the list is empty or the pick is identity.
fn draw(factors: &[f64], rng: &mut dyn RngCore) -> Option<f64> {
    factors.choose(rng).copied().filter(|&f| f != 1.0)
}

fn rate_back(waveform: Vec<f32>, nominal_rate: u32, sample_rate: u32) -> Result<Vec<f32>> {
    if nominal_rate == sample_rate {
        return Ok(waveform);
    }
    resample(&waveform, nominal_rate, sample_rate)
}

/// Play the waveform `factor` times faster by relabeling its sample rate.
///
/// Pitch shifts along with duration. The returned rate must be resampled back
/// to `sample_rate` to obtain the shortened waveform.
fn change_speed(waveform: Vec<f32>, sample_rate: u32, factor: f64) -> (Vec<f32>, u32) {
    let nominal = (sample_rate as f64 * factor).round().max(1.0) as u32;
    (waveform, nominal)
}

/// Time-stretch by `factor` without changing pitch (WSOLA).
///
/// Segments of ~82ms are taken from the input at hop `factor * synthesis_hop`,
/// shifted within a ~15ms search window to the best cross-correlation with
/// the output tail, and overlap-added with a linear crossfade of ~12ms. The
/// last segment is pinned to the end of the input and placed so the output is
/// exactly `round(len / factor)` samples long.
fn change_tempo(waveform: &[f32], sample_rate: u32, factor: f64) -> (Vec<f32>, u32) {
    let rate = sample_rate as f64;
    let segment = (rate * 0.082) as usize;
    let overlap = ((rate * 0.012) as usize).clamp(1, segment.saturating_sub(1).max(1));
    let search = (rate * 0.015) as usize;
    let expected = (waveform.len() as f64 / factor).round() as usize;

    if waveform.len() <= segment || expected < segment || segment <= overlap {
        return (stretch_linear(waveform, expected), sample_rate);
    }

    let synthesis_hop = segment - overlap;
    let analysis_hop = synthesis_hop as f64 * factor;
    let last_start = waveform.len() - segment;

    let mut output: Vec<f32> = waveform[..segment].to_vec();

    for k in 1.. {
        // Leave the rest of the output to the pinned final segment
        if k * synthesis_hop + segment >= expected {
            break;
        }

        let nominal = ((k as f64 * analysis_hop).round() as usize).min(last_start);
        let lo = nominal.saturating_sub(search);
        let hi = (nominal + search).min(last_start);
        let tail = &output[output.len() - overlap..];

        let best = (lo..=hi)
            .map(|start| {
                let candidate = &waveform[start..start + overlap];
                let score: f32 = candidate.iter().zip(tail).map(|(a, b)| a * b).sum();
                (start, score)
            })
            .fold((nominal, f32::NEG_INFINITY), |acc, cur| {
                if cur.1 > acc.1 { cur } else { acc }
            })
            .0;

        let out_start = output.len() - overlap;
        crossfade(&mut output[out_start..], &waveform[best..best + overlap]);
        output.extend_from_slice(&waveform[best + overlap..best + segment]);
    }

    // Final segment runs to the input end. Its start is searched backwards
    // from `last_start`, and its output position follows from `expected`.
    let len = waveform.len();
    let lo = last_start
        .saturating_sub(search)
        .max(len.saturating_sub(expected));
    let (start, _) = (lo..=last_start)
        .map(|start| {
            let out_start = expected - (len - start);
            let score: f32 = output[out_start..out_start + overlap]
                .iter()
                .zip(&waveform[start..start + overlap])
                .map(|(a, b)| a * b)
                .sum();
            (start, score)
        })
        .fold((last_start, f32::NEG_INFINITY), |acc, cur| {
            if cur.1 > acc.1 { cur } else { acc }
        });

    let out_start = expected - (len - start);
    let fade = output.len() - out_start;
    crossfade(&mut output[out_start..], &waveform[start..start + fade]);
    output.extend_from_slice(&waveform[start + fade..]);

    (output, sample_rate)
}

/// Linear crossfade of `src` into `dst` in place.
fn crossfade(dst: &mut [f32], src: &[f32]) {
    let n = dst.len().min(src.len());
    for (i, (d, &s)) in dst.iter_mut().zip(src).enumerate() {
        let w = (i + 1) as f32 / (n + 1) as f32;
        *d = *d * (1.0 - w) + s * w;
    }
}

/// Linear interpolation to `len` samples, used for inputs shorter than a
/// WSOLA segment.
fn stretch_linear(waveform: &[f32], len: usize) -> Vec<f32> {
    if waveform.is_empty() || len == 0 {
        return vec![0.0; len];
    }
    let step = waveform.len() as f64 / len as f64;
    (0..len)
        .map(|i| {
            let pos = i as f64 * step;
            let j = pos.floor() as usize;
            let frac = (pos - j as f64) as f32;
            let a = waveform[j.min(waveform.len() - 1)];
            let b = waveform[(j + 1).min(waveform.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Scale amplitude, clipping to [-1, 1].
fn change_volume(waveform: &mut [f32], factor: f64) {
    let gain = factor as f32;
    for x in waveform.iter_mut() {
        *x = (*x * gain).clamp(-1.0, 1.0);
    }
}
