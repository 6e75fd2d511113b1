//! Streaming speech recognizer seam.
//!
//! Hosts that ship a recognizer (browser speech API bridges, on-device
//! engines) implement [`RecognizerFactory`] and [`SpeechRecognizer`]; the live
//! capture strategy only ever talks to these traits.

mod transcript;

pub use transcript::TranscriptBuffer;

use crate::capture::CaptureError;
use tokio::sync::mpsc;

pub const DEFAULT_LOCALE: &str = "pt-BR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerOptions {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u8,
}

impl Default for RecognizerOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LOCALE.to_string(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
        }
    }
}

/// One recognition result as reported by the engine: the best alternative
/// and whether the engine will still revise it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSegment {
    pub transcript: String,
    pub is_final: bool,
}

impl RecognitionSegment {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            transcript: text.into(),
            is_final: true,
        }
    }

    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            transcript: text.into(),
            is_final: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Cumulative result list for the whole session so far.
    Results(Vec<RecognitionSegment>),
    Error(RecognizerErrorCode),
    /// The engine stopped, on request or on its own.
    End,
}

/// Error codes a recognizer can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerErrorCode {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    LanguageNotSupported,
    Other(String),
}

impl RecognizerErrorCode {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "language-not-supported" => Self::LanguageNotSupported,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::Aborted => "aborted",
            Self::AudioCapture => "audio-capture",
            Self::Network => "network",
            Self::NotAllowed => "not-allowed",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::LanguageNotSupported => "language-not-supported",
            Self::Other(code) => code,
        }
    }

    /// Maps the code to the error surfaced to the user. `None` means the code
    /// is informational and the session keeps running.
    pub fn to_capture_error(&self) -> Option<CaptureError> {
        match self {
            Self::NoSpeech | Self::Aborted => None,
            Self::NotAllowed | Self::ServiceNotAllowed => Some(CaptureError::PermissionDenied),
            other => Some(CaptureError::RecognitionError(other.as_code().to_string())),
        }
    }
}

/// A streaming recognizer instance, owned by exactly one capture session.
pub trait SpeechRecognizer: Send {
    /// Begins listening. Events arrive on the returned channel until `End`
    /// or until the channel closes.
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<RecognizerEvent>, CaptureError>;

    /// Requests a graceful stop; the engine answers with `End`.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Terminates immediately without waiting for `End`.
    fn abort(&mut self);
}

pub trait RecognizerFactory: Send + Sync {
    /// Returns `UnsupportedPlatform` when the host has no recognizer.
    fn create(&self, options: &RecognizerOptions) -> Result<Box<dyn SpeechRecognizer>, CaptureError>;

    fn name(&self) -> &str;
}
