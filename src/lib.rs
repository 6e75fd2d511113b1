//! Voice capture and transcription engine for the mentor chat client.
//!
//! [`RecorderController`] runs one capture session at a time. On web hosts a
//! streaming recognizer produces the transcript live; elsewhere the clip is
//! recorded and uploaded to the transcription service.

pub mod audio;
pub mod capture;
pub mod config;
pub mod recognizer;
pub mod recorder;
pub mod stt;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

pub use audio::{AudioBuffer, AudioPayload, Microphone, PermissionStatus, RecordingHandle, RecordingOptions};
pub use capture::{
    CaptureBackends, CaptureError, CaptureMode, CaptureStrategy, Platform, ReleaseHandle,
    StrategyKind, TranscriptionResult,
};
pub use config::RecorderConfig;
pub use recognizer::{
    RecognitionSegment, RecognizerErrorCode, RecognizerEvent, RecognizerFactory, RecognizerOptions,
    SpeechRecognizer,
};
pub use recorder::{RecorderController, RecorderSnapshot, RecorderState};
pub use stt::{HttpTranscriptionClient, Transcript, TranscriptionClient, TranscriptionError};
pub use timer::DurationTimer;
