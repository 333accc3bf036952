//! Short-time Fourier transform into a log-magnitude grid.

use crate::config::FingerprintConfig;
use crate::error::{RecognizerError, Result};
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use tracing::debug;

/// Smallest magnitude considered before taking the logarithm
const AMIN: f32 = 1e-5;

/// Log-magnitude grid indexed by (frequency bin, time frame).
///
/// Values are in dB relative to the loudest cell, so the maximum is 0.0 and
/// everything else lies in `[-top_db, 0.0]`.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    bins: usize,
    frames: usize,
    /// Row-major by frequency bin: `data[bin * frames + frame]`
    data: Vec<f32>,
}

impl Spectrogram {
    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn get(&self, bin: usize, frame: usize) -> f32 {
        self.data[bin * self.frames + frame]
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Median of every cell; the mean of the two middle cells for even counts
    pub fn median(&self) -> f32 {
        let mut sorted = self.data.clone();
        sorted.sort_unstable_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    /// Builds the spectrogram of `samples`.
    ///
    /// The signal is zero-padded by half a window on each side so frame `t`
    /// is centered on sample `t * hop_size`.
    pub fn build(samples: &[f32], config: &FingerprintConfig) -> Result<Self> {
        if samples.is_empty() {
            return Err(RecognizerError::EmptyInput);
        }

        let window_size = config.window_size;
        let hop_size = config.hop_size;
        let pad = window_size / 2;
        let bins = window_size / 2 + 1;
        let frames = 1 + samples.len() / hop_size;

        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let window = hann_window(window_size);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);

        let mut magnitudes = vec![0.0f32; bins * frames];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); window_size];

        for frame in 0..frames {
            let start = frame * hop_size;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = padded.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * window[i], 0.0);
            }

            fft.process(&mut buffer);

            for (bin, c) in buffer.iter().take(bins).enumerate() {
                magnitudes[bin * frames + frame] = c.norm();
            }
        }

        let data = amplitude_to_db(&magnitudes, config.top_db);
        debug!("Spectrogram: {} bins x {} frames", bins, frames);

        Ok(Self { bins, frames, data })
    }
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n).cos()))
        .collect()
}

fn amplitude_to_db(magnitudes: &[f32], top_db: f32) -> Vec<f32> {
    let reference = magnitudes.iter().copied().fold(AMIN, f32::max);
    let ref_db = 20.0 * reference.log10();

    magnitudes
        .iter()
        .map(|&m| (20.0 * m.max(AMIN).log10() - ref_db).max(-top_db))
        .collect()
}
