// src/stt/mod.rs
// Transcription - remote service client for finished clips

mod http;
mod types;

pub use http::{HttpTranscriptionClient, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS, MAX_PAYLOAD_BYTES};
pub use types::{TranscriptionError, Transcript};

use crate::audio::AudioPayload;
use async_trait::async_trait;

/// One-shot transcription of a complete clip
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Transcribe a finished clip to text. A single attempt, no retries.
    async fn transcribe(&self, payload: &AudioPayload) -> Result<Transcript, TranscriptionError>;

    /// Get provider name
    fn name(&self) -> &str;
}
