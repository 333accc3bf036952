use crate::audio::resample;
use crate::config::{AppConfig, FingerprintConfig};
use crate::error::{RecognizerError, Result};
use crate::fingerprint::AudioFingerprinter;
use crate::matcher::Matcher;
use crate::models::{Recognition, Recording, RecordingId, SongFingerprint, Waveform};
use crate::storage::FingerprintIndex;
use std::borrow::Cow;
use tracing::info;

/// Fingerprints a waveform, resampling it to `config.sample_rate` first
pub fn generate_song_fingerprint(
    waveform: &Waveform,
    config: &FingerprintConfig,
) -> Result<SongFingerprint> {
    let waveform = normalize_rate(waveform, config.sample_rate)?;
    AudioFingerprinter::new(config.clone()).generate_fingerprint(&waveform)
}

fn normalize_rate(waveform: &Waveform, target_rate: u32) -> Result<Cow<'_, Waveform>> {
    waveform.validate()?;
    if waveform.sample_rate == target_rate {
        return Ok(Cow::Borrowed(waveform));
    }
    let samples = resample(&waveform.samples, waveform.sample_rate, target_rate)?;
    Ok(Cow::Owned(Waveform::new(samples, target_rate)))
}

/// Ingestion and recognition on top of a [`FingerprintIndex`].
///
/// Holds no per-request state, so one instance can serve concurrent calls.
pub struct Recognizer<I> {
    fingerprinter: AudioFingerprinter,
    matcher: Matcher,
    index: I,
}

impl<I: FingerprintIndex> Recognizer<I> {
    pub fn new(index: I, config: AppConfig) -> Result<Self> {
        config.fingerprint.validate()?;
        Ok(Self {
            fingerprinter: AudioFingerprinter::new(config.fingerprint),
            matcher: Matcher::new(config.matcher),
            index,
        })
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    fn fingerprint(&self, waveform: &Waveform) -> Result<SongFingerprint> {
        let waveform = normalize_rate(waveform, self.fingerprinter.config().sample_rate)?;
        self.fingerprinter.generate_fingerprint(&waveform)
    }

    /// Fingerprints and stores a recording, returning its new id
    pub fn ingest(&self, waveform: &Waveform, name: &str, artist: &str) -> Result<RecordingId> {
        let song = self.fingerprint(waveform)?;

        let recording_id = self.index.add_recording_with_fingerprints(
            name,
            artist,
            waveform.duration_secs(),
            &song.fingerprints,
        )?;

        info!(
            "Stored '{}' by '{}' as recording {} ({} fingerprints)",
            name,
            artist,
            recording_id,
            song.fingerprints.len()
        );
        Ok(recording_id)
    }

    /// Identifies the recording `waveform` was taken from
    pub fn recognize(&self, waveform: &Waveform) -> Result<Recognition> {
        let sample = self.fingerprint(waveform)?;

        let Some(outcome) = self.matcher.find_match(&sample.fingerprints, &self.index)? else {
            info!("No match among indexed recordings");
            return Ok(Recognition::NotRecognized);
        };

        // A hit whose metadata is gone means the index is inconsistent
        let recording = self.index.get_recording(outcome.recording_id)?.ok_or_else(|| {
            RecognizerError::Storage(format!(
                "no metadata for recording {}",
                outcome.recording_id
            ))
        })?;

        let time_offset_seconds =
            outcome.offset_frames as f32 * self.fingerprinter.config().frame_seconds();
        info!(
            "Recognized '{}' by '{}' (confidence {}, offset {:.2}s)",
            recording.name, recording.artist, outcome.confidence, time_offset_seconds
        );

        Ok(Recognition::Recognized {
            recording_id: recording.id,
            name: recording.name,
            artist: recording.artist,
            confidence: outcome.confidence,
            time_offset_seconds,
        })
    }

    pub fn list_recordings(&self) -> Result<Vec<Recording>> {
        self.index.list_recordings()
    }

    /// Removes a recording and its fingerprints; `false` if the id is unknown
    pub fn remove_recording(&self, id: RecordingId) -> Result<bool> {
        let removed = self.index.remove_recording(id)?;
        if removed {
            info!("Removed recording {}", id);
        }
        Ok(removed)
    }
}
