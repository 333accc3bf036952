use thiserror::Error;

/// Errors surfaced by the fingerprinting and matching pipeline.
///
/// A sample that simply does not match anything is not an error; see
/// [`crate::models::Recognition::NotRecognized`].
#[derive(Debug, Error)]
pub enum RecognizerError {
    /// The waveform has no samples.
    #[error("empty input: waveform contains no samples")]
    EmptyInput,

    /// The supplier handed over something that is not decodable PCM.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The fingerprint index failed to store or look up data.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A configuration file exists but is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RecognizerError>;

impl From<hound::Error> for RecognizerError {
    fn from(err: hound::Error) -> Self {
        RecognizerError::UnsupportedFormat(err.to_string())
    }
}

impl From<std::io::Error> for RecognizerError {
    fn from(err: std::io::Error) -> Self {
        RecognizerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RecognizerError {
    fn from(err: serde_json::Error) -> Self {
        RecognizerError::Storage(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for RecognizerError {
    fn from(err: redis::RedisError) -> Self {
        RecognizerError::Storage(err.to_string())
    }
}
