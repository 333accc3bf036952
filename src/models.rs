use crate::error::{RecognizerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RecordingId = u64;

/// Mono PCM samples at a known sample rate
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Checks that this is usable PCM: a real sample rate, finite samples,
    /// and at least one sample.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(RecognizerError::UnsupportedFormat(
                "sample rate is zero".into(),
            ));
        }
        if self.samples.is_empty() {
            return Err(RecognizerError::EmptyInput);
        }
        if let Some(pos) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(RecognizerError::UnsupportedFormat(format!(
                "non-finite sample at index {}",
                pos
            )));
        }
        Ok(())
    }
}

/// A salient local maximum of the spectrogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub freq_bin: u32,
    pub frame: u32,
    /// Energy in dB relative to the loudest cell
    pub energy: f32,
}

/// An anchor/target peak pair before hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub anchor_freq: u32,
    pub target_freq: u32,
    pub time_delta: u32,
    pub anchor_time: u32,
}

/// Fixed-width digest of (anchor frequency, target frequency, time delta)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenHash(pub u64);

impl TokenHash {
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// What the index stores per token: the hash plus the unhashed anchor time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: TokenHash,
    pub anchor_time: u32,
}

/// Metadata of an indexed recording
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Recording {
    pub id: RecordingId,
    pub name: String,
    pub artist: String,
    pub duration_secs: f32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SongFingerprint {
    pub fingerprints: Vec<Fingerprint>,
    pub duration_secs: f32,
}

/// Outcome of a recognition request
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recognition {
    Recognized {
        recording_id: RecordingId,
        name: String,
        artist: String,
        /// Votes at the winning offset
        confidence: usize,
        time_offset_seconds: f32,
    },
    NotRecognized,
}

impl Recognition {
    pub fn is_recognized(&self) -> bool {
        matches!(self, Recognition::Recognized { .. })
    }

    pub fn recording_id(&self) -> Option<RecordingId> {
        match self {
            Recognition::Recognized { recording_id, .. } => Some(*recording_id),
            Recognition::NotRecognized => None,
        }
    }
}

/// Flat `{recognized, name?, artist?, confidence?, time_offset_seconds?}`
/// shape handed to presentation layers
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RecognitionResponse {
    pub recognized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_offset_seconds: Option<f32>,
}

impl From<&Recognition> for RecognitionResponse {
    fn from(recognition: &Recognition) -> Self {
        match recognition {
            Recognition::Recognized {
                name,
                artist,
                confidence,
                time_offset_seconds,
                ..
            } => Self {
                recognized: true,
                name: Some(name.clone()),
                artist: Some(artist.clone()),
                confidence: Some(*confidence),
                time_offset_seconds: Some(*time_offset_seconds),
            },
            Recognition::NotRecognized => Self {
                recognized: false,
                name: None,
                artist: None,
                confidence: None,
                time_offset_seconds: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_validation() {
        assert!(matches!(
            Waveform::new(vec![], 11_025).validate(),
            Err(RecognizerError::EmptyInput)
        ));
        assert!(matches!(
            Waveform::new(vec![0.1], 0).validate(),
            Err(RecognizerError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            Waveform::new(vec![0.1, f32::NAN], 11_025).validate(),
            Err(RecognizerError::UnsupportedFormat(_))
        ));
        assert!(Waveform::new(vec![0.0; 10], 11_025).validate().is_ok());
    }

    #[test]
    fn test_token_hash_hex_width() {
        assert_eq!(TokenHash(0xab).to_hex(), "00000000000000ab");
        assert_eq!(TokenHash(u64::MAX).to_string().len(), 16);
    }

    #[test]
    fn test_recognition_json_shape() {
        let json = serde_json::to_value(Recognition::NotRecognized).unwrap();
        assert_eq!(json["status"], "not_recognized");

        let hit = Recognition::Recognized {
            recording_id: 3,
            name: "505".into(),
            artist: "Arctic Monkeys".into(),
            confidence: 42,
            time_offset_seconds: 1.5,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["status"], "recognized");
        assert_eq!(json["confidence"], 42);
        assert_eq!(hit.recording_id(), Some(3));
    }

    #[test]
    fn test_response_shape() {
        let miss = serde_json::to_value(RecognitionResponse::from(&Recognition::NotRecognized))
            .unwrap();
        assert_eq!(miss, serde_json::json!({ "recognized": false }));

        let hit = Recognition::Recognized {
            recording_id: 1,
            name: "Like Him".into(),
            artist: "Tyler".into(),
            confidence: 12,
            time_offset_seconds: 2.0,
        };
        let json = serde_json::to_value(RecognitionResponse::from(&hit)).unwrap();
        assert_eq!(json["recognized"], true);
        assert_eq!(json["artist"], "Tyler");
        assert_eq!(json["time_offset_seconds"], 2.0);
    }
}
