//! Tunable constants for fingerprinting and matching.
//!
//! Every threshold the pipeline relies on lives here as a named field so it
//! can be overridden from a JSON file instead of being re-derived in code.

use crate::error::{RecognizerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Parameters for spectrogram, peak and token generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Sample rate every waveform is normalized to before fingerprinting
    pub sample_rate: u32,
    /// STFT window length in samples
    pub window_size: usize,
    /// STFT hop length in samples; one spectrogram frame
    pub hop_size: usize,
    /// Floor of the dB scale, measured below the grid maximum
    pub top_db: f32,

    /// Manhattan radius of the local-maximum footprint
    pub neighborhood_radius: usize,
    /// Margin above the median dB value a peak must exceed
    pub peak_threshold_db: f32,
    pub peaks_per_second: f32,
    pub min_peaks: usize,
    pub max_peaks: usize,

    /// Smallest anchor-to-target distance in frames
    pub min_time_delta: u32,
    /// Lower clamp of the adaptive target zone width
    pub min_max_time_delta: u32,
    /// Upper clamp of the adaptive target zone width
    pub max_max_time_delta: u32,
    /// Seconds of audio per frame of target zone width
    pub target_zone_divisor: f32,
    /// Anchor and target must be more than this many bins apart
    pub min_freq_delta: u32,

    pub fingerprints_per_second: f32,
    pub min_fingerprints: usize,
    pub max_fingerprints: usize,
    /// Seed for down-sampling tokens past the cap. `None` draws from entropy.
    pub sampling_seed: Option<u64>,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            sample_rate: 11_025,
            window_size: 1024,
            hop_size: 512,
            top_db: 80.0,

            neighborhood_radius: 2,
            peak_threshold_db: 15.0,
            peaks_per_second: 50.0,
            min_peaks: 300,
            max_peaks: 3000,

            min_time_delta: 1,
            min_max_time_delta: 10,
            max_max_time_delta: 50,
            target_zone_divisor: 10.0,
            min_freq_delta: 4,

            fingerprints_per_second: 1000.0,
            min_fingerprints: 5000,
            max_fingerprints: 20_000,
            sampling_seed: None,
        }
    }
}

impl FingerprintConfig {
    /// Length of one spectrogram frame in seconds
    pub fn frame_seconds(&self) -> f32 {
        self.hop_size as f32 / self.sample_rate as f32
    }

    /// Peak budget for a recording of the given duration
    pub fn peak_cap(&self, duration_secs: f32) -> usize {
        ((duration_secs * self.peaks_per_second) as usize).clamp(self.min_peaks, self.max_peaks)
    }

    /// Widest allowed anchor-to-target distance for the given duration
    pub fn max_time_delta(&self, duration_secs: f32) -> u32 {
        ((duration_secs / self.target_zone_divisor) as u32)
            .clamp(self.min_max_time_delta, self.max_max_time_delta)
    }

    /// Token budget for a recording of the given duration
    pub fn fingerprint_cap(&self, duration_secs: f32) -> usize {
        ((duration_secs * self.fingerprints_per_second) as usize)
            .clamp(self.min_fingerprints, self.max_fingerprints)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(RecognizerError::Config("sample_rate must be > 0".into()));
        }
        if self.window_size == 0 || self.hop_size == 0 {
            return Err(RecognizerError::Config(
                "window_size and hop_size must be > 0".into(),
            ));
        }
        if self.hop_size > self.window_size {
            return Err(RecognizerError::Config(
                "hop_size must not exceed window_size".into(),
            ));
        }
        if self.min_peaks > self.max_peaks
            || self.min_fingerprints > self.max_fingerprints
            || self.min_max_time_delta > self.max_max_time_delta
        {
            return Err(RecognizerError::Config(
                "lower clamp bounds must not exceed upper bounds".into(),
            ));
        }
        if self.target_zone_divisor <= 0.0 {
            return Err(RecognizerError::Config(
                "target_zone_divisor must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Parameters for alignment voting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Votes at the best offset needed to accept a match (inclusive)
    pub min_confidence: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { min_confidence: 5 }
    }
}

/// Complete recognizer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fingerprint: FingerprintConfig,
    pub matcher: MatcherConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file falls back to defaults. A file that exists but does not
    /// parse or validate is an error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(
                    "Failed to read config file {:?}: {}. Using defaults.",
                    path, err
                );
                return Ok(Self::default());
            }
        };

        let config: AppConfig = serde_json::from_str(&contents)
            .map_err(|e| RecognizerError::Config(format!("{:?}: {}", path, e)))?;
        config.fingerprint.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}
