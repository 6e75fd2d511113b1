// src/stt/types.rs
// Transcription types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transcription result from the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Transcribed text
    pub text: String,
    /// Language reported by the service (e.g., "pt")
    pub language: Option<String>,
    /// Audio duration in seconds
    pub duration_secs: f32,
    /// Provider name
    pub provider: String,
}

/// Transcription client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptionError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    TimeoutError,

    #[error("Empty audio payload")]
    EmptyAudio,

    #[error("Audio payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Service error (HTTP {status}): {message}")]
    ServiceError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TranscriptionError {
    /// True when the request never got an answer from the service.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TranscriptionError::NetworkError(_) | TranscriptionError::TimeoutError
        )
    }
}
