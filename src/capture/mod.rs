pub mod batch;
pub mod error;
pub mod live;

pub use batch::BatchCaptureStrategy;
pub use error::{CaptureError, TranscriptionResult};
pub use live::LiveRecognitionStrategy;

use crate::audio::{Microphone, RecordingOptions};
use crate::config::RecorderConfig;
use crate::recognizer::{RecognizerFactory, RecognizerOptions};
use crate::stt::{HttpTranscriptionClient, TranscriptionClient, TranscriptionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Host family the engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Native,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_arch = "wasm32") {
            Platform::Web
        } else {
            Platform::Native
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "web" | "browser" => Some(Platform::Web),
            "native" | "ios" | "android" | "desktop" => Some(Platform::Native),
            _ => None,
        }
    }
}

/// Which strategy to prefer where both could work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Live recognition on web (batch when no recognizer), batch on native.
    #[default]
    Auto,
    Live,
    Batch,
}

impl CaptureMode {
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "live" | "stream" | "streaming" => CaptureMode::Live,
            "batch" | "record" | "upload" => CaptureMode::Batch,
            _ => CaptureMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Live,
    Batch,
}

impl StrategyKind {
    /// Batch sessions pass through `Transcribing` while the clip is uploaded.
    pub fn transcribes_remotely(self) -> bool {
        matches!(self, StrategyKind::Batch)
    }
}

/// Callbacks from a strategy's background work back into its session.
///
/// Every method is a no-op once the session is no longer current.
pub trait SessionEvents: Send + Sync {
    fn is_current(&self) -> bool;

    fn report_error(&self, error: CaptureError);

    /// The underlying engine stopped without being asked to.
    fn ended(&self);
}

/// Releases a strategy's resource from outside the future driving it, so a
/// cancel can take effect while `finalize` is still running. Idempotent.
#[derive(Clone)]
pub struct ReleaseHandle(Arc<dyn Fn() + Send + Sync>);

impl ReleaseHandle {
    pub fn new(release: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(release))
    }

    pub fn release(&self) {
        (self.0)()
    }
}

/// How audio becomes text for one session.
#[async_trait]
pub trait CaptureStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Acquires the microphone/recognizer. On error nothing stays held.
    async fn acquire(&mut self, events: Arc<dyn SessionEvents>) -> Result<(), CaptureError>;

    /// Ends capture, releases the resource and produces the session's text.
    async fn finalize(&mut self) -> TranscriptionResult;

    /// Releases the resource immediately, discarding partial data. Idempotent.
    fn abort(&mut self);

    /// Interim text for a live preview, if the strategy has one.
    fn preview(&self) -> Option<String> {
        None
    }

    /// Handle that aborts the acquired resource even mid-`finalize`. `None`
    /// when `finalize` holds nothing worth aborting.
    fn release_handle(&self) -> Option<ReleaseHandle> {
        None
    }
}

/// Platform collaborators the engine can draw on.
#[derive(Clone, Default)]
pub struct CaptureBackends {
    pub recognizer: Option<Arc<dyn RecognizerFactory>>,
    pub microphone: Option<Arc<dyn Microphone>>,
    pub transcriber: Option<Arc<dyn TranscriptionClient>>,
}

impl CaptureBackends {
    /// HTTP transcriber from the config, plus the cpal microphone when the
    /// `native-audio` feature is enabled.
    pub fn from_config(config: &RecorderConfig) -> Result<Self, TranscriptionError> {
        let transcriber = HttpTranscriptionClient::from_config(&config.transcription)?;
        let backends = Self::default().with_transcriber(Arc::new(transcriber));
        #[cfg(feature = "native-audio")]
        let backends = backends.with_microphone(Arc::new(crate::audio::CpalMicrophone::new()));
        Ok(backends)
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn RecognizerFactory>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_microphone(mut self, microphone: Arc<dyn Microphone>) -> Self {
        self.microphone = Some(microphone);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn TranscriptionClient>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }
}

/// Picks a fresh strategy for every session.
pub struct StrategySelector {
    platform: Platform,
    mode: CaptureMode,
    backends: CaptureBackends,
    recognizer_options: RecognizerOptions,
    recording_options: RecordingOptions,
    finalize_grace: Duration,
}

impl StrategySelector {
    pub fn new(config: &RecorderConfig, backends: CaptureBackends) -> Self {
        let recognizer_options = RecognizerOptions {
            language: config.language.clone(),
            ..RecognizerOptions::default()
        };
        let recording_options = RecordingOptions {
            input_device_name: config.input_device_name.clone(),
            ..RecordingOptions::default()
        };
        Self {
            platform: config.platform(),
            mode: config.capture_mode,
            backends,
            recognizer_options,
            recording_options,
            finalize_grace: Duration::from_millis(config.live_finalize_grace_ms),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The kind `select` would build, or why none is available.
    pub fn resolve(&self) -> Result<StrategyKind, CaptureError> {
        let has_live = self.backends.recognizer.is_some();
        let has_batch = self.backends.microphone.is_some() && self.backends.transcriber.is_some();

        let kind = match (self.mode, self.platform) {
            (CaptureMode::Live, _) => has_live.then_some(StrategyKind::Live),
            (CaptureMode::Batch, _) => has_batch.then_some(StrategyKind::Batch),
            (CaptureMode::Auto, Platform::Web) => {
                if has_live {
                    Some(StrategyKind::Live)
                } else {
                    has_batch.then_some(StrategyKind::Batch)
                }
            }
            (CaptureMode::Auto, Platform::Native) => has_batch.then_some(StrategyKind::Batch),
        };
        kind.ok_or(CaptureError::UnsupportedPlatform)
    }

    pub fn select(&self) -> Result<Box<dyn CaptureStrategy>, CaptureError> {
        match self.resolve()? {
            StrategyKind::Live => {
                let factory = self
                    .backends
                    .recognizer
                    .clone()
                    .ok_or(CaptureError::UnsupportedPlatform)?;
                Ok(Box::new(LiveRecognitionStrategy::new(
                    factory,
                    self.recognizer_options.clone(),
                    self.finalize_grace,
                )))
            }
            StrategyKind::Batch => {
                let microphone = self
                    .backends
                    .microphone
                    .clone()
                    .ok_or(CaptureError::UnsupportedPlatform)?;
                let transcriber = self
                    .backends
                    .transcriber
                    .clone()
                    .ok_or(CaptureError::UnsupportedPlatform)?;
                Ok(Box::new(BatchCaptureStrategy::new(
                    microphone,
                    transcriber,
                    self.recording_options.clone(),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockMicrophone, MockRecognizerFactory, MockTranscriber};

    fn config(platform: Platform, mode: CaptureMode) -> RecorderConfig {
        RecorderConfig {
            platform: Some(platform),
            capture_mode: mode,
            ..RecorderConfig::default()
        }
    }

    fn all_backends() -> CaptureBackends {
        CaptureBackends::default()
            .with_recognizer(MockRecognizerFactory::new().0)
            .with_microphone(MockMicrophone::with_clip(1.0))
            .with_transcriber(MockTranscriber::replying("ok"))
    }

    #[test]
    fn web_prefers_live_recognition() {
        let selector = StrategySelector::new(&config(Platform::Web, CaptureMode::Auto), all_backends());
        assert_eq!(selector.resolve(), Ok(StrategyKind::Live));
    }

    #[test]
    fn web_falls_back_to_batch_without_recognizer() {
        let backends = CaptureBackends {
            recognizer: None,
            ..all_backends()
        };
        let selector = StrategySelector::new(&config(Platform::Web, CaptureMode::Auto), backends);
        assert_eq!(selector.resolve(), Ok(StrategyKind::Batch));
    }

    #[test]
    fn native_always_records_then_uploads() {
        let selector =
            StrategySelector::new(&config(Platform::Native, CaptureMode::Auto), all_backends());
        assert_eq!(selector.resolve(), Ok(StrategyKind::Batch));
        assert_eq!(selector.select().map(|s| s.kind()).ok(), Some(StrategyKind::Batch));
    }

    #[test]
    fn missing_capabilities_are_unsupported() {
        let selector =
            StrategySelector::new(&config(Platform::Web, CaptureMode::Auto), CaptureBackends::default());
        assert_eq!(selector.resolve(), Err(CaptureError::UnsupportedPlatform));

        let mic_only = CaptureBackends::default().with_microphone(MockMicrophone::with_clip(1.0));
        let selector = StrategySelector::new(&config(Platform::Native, CaptureMode::Auto), mic_only);
        assert_eq!(selector.resolve(), Err(CaptureError::UnsupportedPlatform));
    }

    #[test]
    fn explicit_mode_overrides_platform_default() {
        let selector =
            StrategySelector::new(&config(Platform::Web, CaptureMode::Batch), all_backends());
        assert_eq!(selector.resolve(), Ok(StrategyKind::Batch));

        let selector =
            StrategySelector::new(&config(Platform::Native, CaptureMode::Live), all_backends());
        assert_eq!(selector.resolve(), Ok(StrategyKind::Live));
    }

    #[test]
    fn release_handle_clones_share_the_release() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = ReleaseHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let copy = handle.clone();
        handle.release();
        copy.release();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn parses_platform_and_mode_names() {
        assert_eq!(Platform::parse("Browser"), Some(Platform::Web));
        assert_eq!(Platform::parse("android"), Some(Platform::Native));
        assert_eq!(Platform::parse("toaster"), None);
        assert_eq!(CaptureMode::parse("upload"), CaptureMode::Batch);
        assert_eq!(CaptureMode::parse("whatever"), CaptureMode::Auto);
    }
}
