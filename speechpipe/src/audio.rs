//! Audio loading with exact sample-range arithmetic.

use crate::error::{AudioError, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;

/// Decoded audio segment.
#[derive(Clone, Debug)]
pub struct LoadedAudio {
    /// Mono samples in [-1, 1]
    pub waveform: Vec<f32>,
    /// Native sample rate of the file
    pub sample_rate: u32,
    /// Seconds actually decoded: `waveform.len() / sample_rate`
    pub duration: f64,
}

/// Convert seconds to a sample count.
///
/// The fractional sample part is first rounded to 8 decimal digits, then the
/// count is rounded half-up (not half-to-even). The 8 digit step absorbs
/// representation error, so a boundary landing on exactly half a sample
/// always rounds the same way.
pub fn seconds_to_samples(sample_rate: u32, seconds: f64) -> usize {
    let x = (seconds * sample_rate as f64).max(0.0);
    let whole = x.floor();
    let frac = ((x - whole) * 1e8).round() / 1e8;
    let samples = if frac >= 0.5 { whole + 1.0 } else { whole };
    samples as usize
}

/// Load `[begin, begin + duration)` seconds of a WAV file as mono samples.
///
/// The decoded range is clipped to the end of the file. Pass
/// [`crate::sample::FLOAT_INF`] as `duration` to read to the end.
///
/// # Errors
///
/// Returns error if the file cannot be read or has an invalid header.
pub fn load_audio(path: impl AsRef<Path>, begin: f64, duration: f64) -> Result<LoadedAudio> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_rate == 0 {
        return Err(AudioError::InvalidSampleRate(spec.sample_rate).into());
    }
    if spec.channels == 0 {
        return Err(AudioError::InvalidChannels(spec.channels).into());
    }

    let total_frames = reader.duration() as usize;
    let file_secs = total_frames as f64 / spec.sample_rate as f64;
    let actual = (file_secs - begin).min(duration).max(0.0);

    let offset = seconds_to_samples(spec.sample_rate, begin).min(total_frames);
    let num_frames = seconds_to_samples(spec.sample_rate, actual).min(total_frames - offset);

    reader.seek(offset as u32).map_err(AudioError::from)?;

    let channels = spec.channels as usize;
    let num_samples = num_frames * channels;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .take(num_samples)
            .collect::<hound::Result<_>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .take(num_samples)
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<hound::Result<_>>()?
        }
    };

    let waveform: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    let duration = waveform.len() as f64 / spec.sample_rate as f64;

    tracing::trace!(
        frames = waveform.len(),
        sample_rate = spec.sample_rate,
        duration,
        "audio loaded"
    );

    Ok(LoadedAudio {
        waveform,
        sample_rate: spec.sample_rate,
        duration,
    })
}
