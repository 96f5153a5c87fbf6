//! Audio resampling.

use crate::error::{AudioError, Result};
use rubato::{FftFixedIn, Resampler as RubatoResampler};
use serde::Deserialize;

/// Input chunk size fed to the FFT resampler.
const CHUNK_SIZE: usize = 1024;

/// Resample a mono waveform from `from` Hz to `to` Hz.
///
/// The output has exactly `ceil(len * to / from)` samples with the filter
/// delay removed.
///
/// # Errors
///
/// Returns error if either rate is zero or the resampler fails.
pub fn resample(waveform: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == 0 {
        return Err(AudioError::InvalidSampleRate(from).into());
    }
    if to == 0 {
        return Err(AudioError::InvalidSampleRate(to).into());
    }
    if from == to || waveform.is_empty() {
        return Ok(waveform.to_vec());
    }

    let expected = (waveform.len() as u64 * to as u64).div_ceil(from as u64) as usize;

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK_SIZE, 2, 1)?;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay);

    let mut chunks = waveform.chunks_exact(CHUNK_SIZE);
    for chunk in &mut chunks {
        let mut out = resampler.process(&[chunk], None)?;
        output.append(&mut out[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let mut out = resampler.process_partial(Some(&[remainder][..]), None)?;
        output.append(&mut out[0]);
    }

    // Flush the filter tail until the delayed samples are out
    while output.len() < expected + delay {
        let mut out = resampler.process_partial::<&[f32]>(None, None)?;
        if out[0].is_empty() {
            break;
        }
        output.append(&mut out[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);

    Ok(output)
}

/// Converts waveforms to a fixed target sample rate.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Resampler {
    /// Target sample rate in Hz
    pub sample_rate: u32,
}

impl Resampler {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Resample to the target rate; a no-op when the rate already matches.
    pub fn apply(&self, waveform: Vec<f32>, sample_rate: u32) -> Result<(Vec<f32>, u32)> {
        if sample_rate == self.sample_rate {
            return Ok((waveform, sample_rate));
        }
        let waveform = resample(&waveform, sample_rate, self.sample_rate)?;
        Ok((waveform, self.sample_rate))
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new(16000)
    }
}
