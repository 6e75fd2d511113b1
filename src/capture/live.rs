use super::{
    CaptureError, CaptureStrategy, ReleaseHandle, SessionEvents, StrategyKind, TranscriptionResult,
};
use crate::recognizer::{
    RecognizerEvent, RecognizerFactory, RecognizerOptions, SpeechRecognizer, TranscriptBuffer,
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Streams audio through an on-device/browser recognizer; the transcript
/// builds up while the session is active.
pub struct LiveRecognitionStrategy {
    factory: Arc<dyn RecognizerFactory>,
    options: RecognizerOptions,
    finalize_grace: Duration,
    session: Option<LiveSession>,
}

struct LiveSession {
    engine: Arc<RecognizerSlot>,
    transcript: Arc<Mutex<TranscriptBuffer>>,
    ended: watch::Receiver<bool>,
}

/// The recognizer and its event pump, shared with the session's release
/// handle. Whoever empties the slot first owns the teardown.
struct RecognizerSlot {
    recognizer: Mutex<Option<Box<dyn SpeechRecognizer>>>,
    pump: AbortHandle,
    /// Set once stop/abort was requested; the pump then stays quiet on `End`.
    finalizing: Arc<AtomicBool>,
}

impl RecognizerSlot {
    fn stop(&self) -> Result<(), CaptureError> {
        self.finalizing.store(true, Ordering::SeqCst);
        let mut guard = self.recognizer.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(recognizer) => recognizer.stop(),
            None => Ok(()),
        }
    }

    /// Aborts and drops the recognizer, then stops the pump. Returns false
    /// when the slot was already empty.
    fn abort(&self) -> bool {
        self.finalizing.store(true, Ordering::SeqCst);
        let taken = self
            .recognizer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.pump.abort();
        match taken {
            Some(mut recognizer) => {
                recognizer.abort();
                true
            }
            None => false,
        }
    }

    /// Drops a recognizer that already ended gracefully.
    fn close(&self) {
        let taken = self
            .recognizer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.pump.abort();
        drop(taken);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.engine.abort();
    }
}

impl LiveRecognitionStrategy {
    pub fn new(
        factory: Arc<dyn RecognizerFactory>,
        options: RecognizerOptions,
        finalize_grace: Duration,
    ) -> Self {
        Self {
            factory,
            options,
            finalize_grace,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

#[async_trait]
impl CaptureStrategy for LiveRecognitionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Live
    }

    async fn acquire(&mut self, events: Arc<dyn SessionEvents>) -> Result<(), CaptureError> {
        self.abort();

        let mut recognizer = self.factory.create(&self.options)?;
        let event_rx = match recognizer.start() {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Error starting speech recognition: {}", e);
                recognizer.abort();
                return Err(match e {
                    CaptureError::PermissionDenied
                    | CaptureError::UnsupportedPlatform
                    | CaptureError::StartFailed(_) => e,
                    other => CaptureError::StartFailed(other.to_string()),
                });
            }
        };

        let transcript = Arc::new(Mutex::new(TranscriptBuffer::new()));
        let finalizing = Arc::new(AtomicBool::new(false));
        let (ended_tx, ended_rx) = watch::channel(false);
        let pump = tokio::spawn(pump_events(
            event_rx,
            transcript.clone(),
            finalizing.clone(),
            ended_tx,
            events,
        ));

        info!(
            "Speech recognition started ({}, {})",
            self.options.language,
            self.factory.name()
        );
        self.session = Some(LiveSession {
            engine: Arc::new(RecognizerSlot {
                recognizer: Mutex::new(Some(recognizer)),
                pump: pump.abort_handle(),
                finalizing,
            }),
            transcript,
            ended: ended_rx,
        });
        Ok(())
    }

    async fn finalize(&mut self) -> TranscriptionResult {
        let Some(session) = self.session.take() else {
            return Ok(String::new());
        };

        match session.engine.stop() {
            Ok(()) => {
                let mut ended = session.ended.clone();
                let ended_in_time =
                    tokio::time::timeout(self.finalize_grace, wait_for_end(&mut ended))
                        .await
                        .is_ok();
                if !ended_in_time {
                    warn!(
                        "Recognizer did not end within {:?}, returning accumulated transcript",
                        self.finalize_grace
                    );
                    session.engine.abort();
                }
            }
            Err(e) => {
                // Already stopped: whatever was collected is the answer.
                debug!("Recognizer stop failed ({}), using accumulated transcript", e);
                session.engine.abort();
            }
        }
        session.engine.close();

        let text = session
            .transcript
            .lock()
            .map(|t| t.final_text().to_string())
            .unwrap_or_default();
        info!("Speech recognition finalized: {} chars", text.len());
        Ok(text)
    }

    fn abort(&mut self) {
        if let Some(session) = self.session.take() {
            session.engine.abort();
            if let Ok(mut transcript) = session.transcript.lock() {
                transcript.clear();
            }
            debug!("Speech recognition aborted");
        }
    }

    fn preview(&self) -> Option<String> {
        let session = self.session.as_ref()?;
        let preview = session.transcript.lock().ok()?.preview();
        (!preview.is_empty()).then_some(preview)
    }

    fn release_handle(&self) -> Option<ReleaseHandle> {
        let engine = self.session.as_ref()?.engine.clone();
        Some(ReleaseHandle::new(move || {
            if engine.abort() {
                debug!("Speech recognition released");
            }
        }))
    }
}

impl Drop for LiveRecognitionStrategy {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn wait_for_end(ended: &mut watch::Receiver<bool>) {
    let _ = ended.wait_for(|done| *done).await;
}

async fn pump_events(
    mut event_rx: mpsc::UnboundedReceiver<RecognizerEvent>,
    transcript: Arc<Mutex<TranscriptBuffer>>,
    finalizing: Arc<AtomicBool>,
    ended_tx: watch::Sender<bool>,
    events: Arc<dyn SessionEvents>,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            RecognizerEvent::Results(segments) => {
                if !events.is_current() {
                    continue;
                }
                if let Ok(mut guard) = transcript.lock() {
                    guard.apply(&segments);
                    debug!("Transcript update: {}", guard.preview());
                }
            }
            RecognizerEvent::Error(code) => match code.to_capture_error() {
                None => debug!("Recognizer reported '{}', continuing", code.as_code()),
                Some(err) => {
                    warn!("Speech recognition error: {}", code.as_code());
                    if events.is_current() {
                        events.report_error(err);
                    }
                }
            },
            RecognizerEvent::End => break,
        }
    }

    info!("Speech recognition ended");
    let _ = ended_tx.send(true);
    if !finalizing.load(Ordering::SeqCst) {
        events.ended();
    }
}
