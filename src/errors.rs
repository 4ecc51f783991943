use thiserror::Error;

/// Errors surfaced by the recorder.
///
/// `Resolution` deliberately renders as a generic message; the underlying
/// cause is carried in the variant so callers can log it.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to extract the stream URL")]
    Resolution(String),

    #[error("Failed to connect to the IP camera: {0}")]
    DeviceOpen(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Muxing error: {0}")]
    Muxing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("No recording is in progress")]
    NotRecording,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl RecorderError {
    /// Detail suitable for logs; for `Resolution` this is the hidden cause.
    pub fn detail(&self) -> String {
        match self {
            RecorderError::Resolution(cause) => cause.clone(),
            other => other.to_string(),
        }
    }
}

pub type RecorderResult<T> = Result<T, RecorderError>;
