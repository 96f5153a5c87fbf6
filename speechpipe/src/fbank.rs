//! Kaldi-compatible log-mel filterbank features.

use ndarray::Array2;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};
use rustfft::{FftPlanner, num_complex::Complex};
use serde::Deserialize;
use std::f64::consts::PI;

/// Scale from normalized [-1, 1] audio to 16-bit PCM amplitude.
const INT16_MAX: f32 = i16::MAX as f32;

/// Frame length in milliseconds
const FRAME_LENGTH_MS: f64 = 25.0;

/// Frame shift in milliseconds
const FRAME_SHIFT_MS: f64 = 10.0;

const PREEMPHASIS: f32 = 0.97;

/// Lowest mel bin edge in Hz
const LOW_FREQ: f64 = 20.0;

/// Log-mel filterbank (fbank) feature extractor.
///
/// Uses Kaldi defaults: 25ms Povey-windowed frames every 10ms with edges
/// snipped, DC removal, 0.97 preemphasis, power spectrum and a log floor of
/// `f32::EPSILON`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FbankExtractor {
    pub num_mel_bins: usize,
    /// Gaussian dither scale in PCM units, 0 disables dithering
    #[serde(default)]
    pub dither: f32,
}

impl FbankExtractor {
    pub fn new(num_mel_bins: usize, dither: f32) -> Self {
        Self {
            num_mel_bins,
            dither,
        }
    }

    /// Number of frames produced for `num_samples` input samples.
    pub fn num_frames(&self, num_samples: usize, sample_rate: u32) -> usize {
        let (window, shift) = frame_geometry(sample_rate);
        if num_samples < window {
            0
        } else {
            1 + (num_samples - window) / shift
        }
    }

    /// Compute log-mel energies.
    ///
    /// # Arguments
    ///
    /// * `waveform` - mono samples in [-1, 1]
    /// * `sample_rate` - sample rate of `waveform`
    /// * `rng` - noise source for dithering
    ///
    /// # Returns
    ///
    /// 2D array of features (num_frames, num_mel_bins)
    pub fn apply(&self, waveform: &[f32], sample_rate: u32, rng: &mut dyn RngCore) -> Array2<f32> {
        let (window_length, shift) = frame_geometry(sample_rate);
        let num_frames = self.num_frames(waveform.len(), sample_rate);
        let mut features = Array2::<f32>::zeros((num_frames, self.num_mel_bins));

        if num_frames == 0 || self.num_mel_bins == 0 {
            return features;
        }

        let n_fft = window_length.next_power_of_two();
        let window = povey_window(window_length);
        let filterbank = create_mel_filterbank(n_fft, self.num_mel_bins, sample_rate);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);

        let mut frame = vec![0.0f32; window_length];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
        let mut power = vec![0.0f32; n_fft / 2];

        for (t, mut row) in features.rows_mut().into_iter().enumerate() {
            let start = t * shift;
            for (dst, &src) in frame.iter_mut().zip(&waveform[start..start + window_length]) {
                *dst = src * INT16_MAX;
            }

            if self.dither != 0.0 {
                for x in frame.iter_mut() {
                    let noise: f32 = StandardNormal.sample(rng);
                    *x += self.dither * noise;
                }
            }

            remove_dc_offset(&mut frame);
            apply_preemphasis(&mut frame, PREEMPHASIS);

            buffer.fill(Complex::new(0.0, 0.0));
            for (i, (&x, &w)) in frame.iter().zip(&window).enumerate() {
                buffer[i] = Complex::new(x * w, 0.0);
            }

            fft.process(&mut buffer);

            for (p, c) in power.iter_mut().zip(&buffer) {
                *p = c.norm_sqr();
            }

            for (m, value) in row.iter_mut().enumerate() {
                let energy: f32 = filterbank
                    .row(m)
                    .iter()
                    .zip(&power)
                    .map(|(w, p)| w * p)
                    .sum();
                *value = energy.max(f32::EPSILON).ln();
            }
        }

        features
    }
}

impl Default for FbankExtractor {
    fn default() -> Self {
        Self::new(80, 0.0)
    }
}

/// Window length and shift in samples.
fn frame_geometry(sample_rate: u32) -> (usize, usize) {
    let rate = sample_rate as f64;
    let window = (rate * FRAME_LENGTH_MS / 1000.0) as usize;
    let shift = (rate * FRAME_SHIFT_MS / 1000.0) as usize;
    (window.max(1), shift.max(1))
}

fn remove_dc_offset(frame: &mut [f32]) {
    let mean = frame.iter().sum::<f32>() / frame.len() as f32;
    for x in frame.iter_mut() {
        *x -= mean;
    }
}

/// Apply preemphasis in place: `x[i] -= coef * x[i-1]`, `x[0] -= coef * x[0]`.
fn apply_preemphasis(frame: &mut [f32], coef: f32) {
    for i in (1..frame.len()).rev() {
        frame[i] -= coef * frame[i - 1];
    }
    if let Some(first) = frame.first_mut() {
        *first -= coef * *first;
    }
}

/// Povey window: Hann raised to the power 0.85.
fn povey_window(window_length: usize) -> Vec<f32> {
    let denom = (window_length.max(2) - 1) as f64;
    (0..window_length)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / denom).cos()).powf(0.85) as f32)
        .collect()
}

/// Convert frequency in Hz to mel scale (natural log form).
fn hz_to_mel(freq: f64) -> f64 {
    1127.0 * (1.0 + freq / 700.0).ln()
}

/// Create triangular mel filterbank (n_mels, n_fft / 2).
///
/// Bins are spaced evenly on the mel scale between 20Hz and Nyquist; the
/// Nyquist FFT bin is excluded.
fn create_mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: u32) -> Array2<f32> {
    let num_fft_bins = n_fft / 2;
    let mut filterbank = Array2::<f32>::zeros((n_mels, num_fft_bins));

    let nyquist = sample_rate as f64 / 2.0;
    let mel_low = hz_to_mel(LOW_FREQ.min(nyquist));
    let mel_high = hz_to_mel(nyquist);
    let mel_delta = (mel_high - mel_low) / (n_mels + 1) as f64;

    let fft_bin_width = sample_rate as f64 / n_fft as f64;

    for m in 0..n_mels {
        let left = mel_low + m as f64 * mel_delta;
        let center = left + mel_delta;
        let right = center + mel_delta;

        for k in 0..num_fft_bins {
            let mel = hz_to_mel(fft_bin_width * k as f64);
            if mel > left && mel < right {
                filterbank[[m, k]] = if mel <= center {
                    ((mel - left) / (center - left)) as f32
                } else {
                    ((right - mel) / (right - center)) as f32
                };
            }
        }
    }

    filterbank
}
