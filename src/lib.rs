pub mod audio;
pub mod config;
pub mod core;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod models;
pub mod peaks;
pub mod spectrogram;
pub mod storage;

pub use audio::AudioLoader;
pub use config::{AppConfig, FingerprintConfig, MatcherConfig};
pub use crate::core::{generate_song_fingerprint, Recognizer};
pub use error::{RecognizerError, Result};
pub use fingerprint::AudioFingerprinter;
pub use models::{Recognition, RecognitionResponse, Recording, RecordingId, Waveform};
pub use storage::{FingerprintIndex, JsonFileIndex, MemoryIndex};
