use super::{CaptureError, CaptureStrategy, SessionEvents, StrategyKind, TranscriptionResult};
use crate::audio::{Microphone, PermissionStatus, RecordingHandle, RecordingOptions};
use crate::stt::TranscriptionClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records the whole clip, then transcribes it once through the service.
pub struct BatchCaptureStrategy {
    microphone: Arc<dyn Microphone>,
    transcriber: Arc<dyn TranscriptionClient>,
    options: RecordingOptions,
    recording: Option<Box<dyn RecordingHandle>>,
}

impl BatchCaptureStrategy {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        transcriber: Arc<dyn TranscriptionClient>,
        options: RecordingOptions,
    ) -> Self {
        Self {
            microphone,
            transcriber,
            options,
            recording: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }
}

#[async_trait]
impl CaptureStrategy for BatchCaptureStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Batch
    }

    async fn acquire(&mut self, _events: Arc<dyn SessionEvents>) -> Result<(), CaptureError> {
        self.abort();

        if self.microphone.request_permission().await == PermissionStatus::Denied {
            warn!("Microphone permission denied");
            return Err(CaptureError::PermissionDenied);
        }

        let recording = self.microphone.open(&self.options).await.map_err(|e| {
            warn!("Error starting recording on {}: {:?}", self.microphone.name(), e);
            e
        })?;
        info!("Recording started on {}", self.microphone.name());
        self.recording = Some(recording);
        Ok(())
    }

    async fn finalize(&mut self) -> TranscriptionResult {
        let Some(recording) = self.recording.take() else {
            return Err(CaptureError::EmptyCapture);
        };

        // The device is released here, before any network I/O.
        let payload = recording.finish().await?;
        if payload.is_empty() {
            info!("Recording is empty, skipping transcription");
            return Err(CaptureError::EmptyCapture);
        }

        let transcript = self.transcriber.transcribe(&payload).await.map_err(|e| {
            warn!("Transcription via {} failed: {}", self.transcriber.name(), e);
            CaptureError::from(e)
        })?;
        Ok(transcript.text)
    }

    fn abort(&mut self) {
        if let Some(recording) = self.recording.take() {
            recording.discard();
            debug!("Recording discarded");
        }
    }
}

impl Drop for BatchCaptureStrategy {
    fn drop(&mut self) {
        self.abort();
    }
}
