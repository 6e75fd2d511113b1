pub mod buffer;
#[cfg(feature = "native-audio")]
pub mod capture;
pub mod payload;

pub use buffer::AudioBuffer;
#[cfg(feature = "native-audio")]
pub use capture::CpalMicrophone;
pub use payload::{encode_wav, AudioPayload};

use crate::capture::CaptureError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Recording parameters tuned for speech.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOptions {
    pub preferred_sample_rate: u32,
    pub preferred_channels: u16,
    pub input_device_name: Option<String>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            preferred_sample_rate: 16_000,
            preferred_channels: 1,
            input_device_name: None,
        }
    }
}

/// Platform microphone: permission prompt plus recording sessions.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;

    /// Opens the device and starts buffering audio.
    async fn open(&self, options: &RecordingOptions) -> Result<Box<dyn RecordingHandle>, CaptureError>;

    fn name(&self) -> &str;
}

/// An open recording. Both exits consume the handle, so the device is
/// released exactly once.
#[async_trait]
pub trait RecordingHandle: Send {
    /// Stops the recording, releases the device and returns the clip.
    async fn finish(self: Box<Self>) -> Result<AudioPayload, CaptureError>;

    /// Stops the recording and drops everything buffered so far.
    fn discard(self: Box<Self>);
}
