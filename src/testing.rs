//! Test doubles for the platform seams. Every double counts how often its
//! resource was opened and released so tests can check for leaks.

use crate::audio::{AudioPayload, Microphone, PermissionStatus, RecordingHandle, RecordingOptions};
use crate::capture::{CaptureError, SessionEvents};
use crate::recognizer::{RecognizerEvent, RecognizerFactory, RecognizerOptions, SpeechRecognizer};
use crate::stt::{Transcript, TranscriptionClient, TranscriptionError};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Polls `cond` until it holds; panics after ~5s of (possibly paused) time.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[derive(Default)]
pub struct RecordingEvents {
    errors: Mutex<Vec<CaptureError>>,
    ended: AtomicUsize,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<CaptureError> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn ended_count(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }
}

impl SessionEvents for RecordingEvents {
    fn is_current(&self) -> bool {
        true
    }

    fn report_error(&self, error: CaptureError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error);
        }
    }

    fn ended(&self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------- microphone ----------

#[derive(Default)]
struct MicCounters {
    permission_requests: AtomicUsize,
    opened: AtomicUsize,
    finished: AtomicUsize,
    discarded: AtomicUsize,
    released: AtomicUsize,
}

pub struct MockMicrophone {
    permission: PermissionStatus,
    clip_secs: f32,
    open_gate: Option<Arc<Notify>>,
    counters: Arc<MicCounters>,
}

impl MockMicrophone {
    /// Grants permission and records `clip_secs` of audio (0 = nothing).
    pub fn with_clip(clip_secs: f32) -> Arc<Self> {
        Arc::new(Self {
            permission: PermissionStatus::Granted,
            clip_secs,
            open_gate: None,
            counters: Arc::default(),
        })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            permission: PermissionStatus::Denied,
            clip_secs: 0.0,
            open_gate: None,
            counters: Arc::default(),
        })
    }

    /// `open` blocks until the returned gate is notified.
    pub fn gated(clip_secs: f32) -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let mic = Arc::new(Self {
            permission: PermissionStatus::Granted,
            clip_secs,
            open_gate: Some(gate.clone()),
            counters: Arc::default(),
        });
        (mic, gate)
    }

    pub fn permission_requests(&self) -> usize {
        self.counters.permission_requests.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.counters.finished.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.counters.discarded.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.open_count() > self.released()
    }
}

#[async_trait]
impl Microphone for MockMicrophone {
    async fn request_permission(&self) -> PermissionStatus {
        self.counters.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permission
    }

    async fn open(&self, _options: &RecordingOptions) -> Result<Box<dyn RecordingHandle>, CaptureError> {
        if let Some(gate) = &self.open_gate {
            gate.notified().await;
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockRecording {
            clip_secs: self.clip_secs,
            counters: self.counters.clone(),
        }))
    }

    fn name(&self) -> &str {
        "mock microphone"
    }
}

struct MockRecording {
    clip_secs: f32,
    counters: Arc<MicCounters>,
}

#[async_trait]
impl RecordingHandle for MockRecording {
    async fn finish(self: Box<Self>) -> Result<AudioPayload, CaptureError> {
        self.counters.finished.fetch_add(1, Ordering::SeqCst);
        let bytes = if self.clip_secs > 0.0 {
            vec![1u8; (self.clip_secs * 1_000.0) as usize]
        } else {
            Vec::new()
        };
        Ok(AudioPayload::new(bytes, "audio/m4a", "recording.m4a", self.clip_secs))
    }

    fn discard(self: Box<Self>) {
        self.counters.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockRecording {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------- transcription ----------

pub struct MockTranscriber {
    reply: Result<String, TranscriptionError>,
    calls: AtomicUsize,
    started: Notify,
    gate: Option<Notify>,
    watched_mic: Mutex<Option<Arc<MockMicrophone>>>,
    mic_held: Mutex<Option<bool>>,
}

impl MockTranscriber {
    fn build(reply: Result<String, TranscriptionError>, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            gate: gated.then(Notify::new),
            watched_mic: Mutex::new(None),
            mic_held: Mutex::new(None),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        Self::build(Ok(text.to_string()), false)
    }

    pub fn failing(error: TranscriptionError) -> Arc<Self> {
        Self::build(Err(error), false)
    }

    /// Replies only after `release` is called.
    pub fn gated(text: &str) -> Arc<Self> {
        Self::build(Ok(text.to_string()), true)
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Records whether `mic` still held a device when the upload began.
    pub fn expect_released(&self, mic: Arc<MockMicrophone>) {
        if let Ok(mut watched) = self.watched_mic.lock() {
            *watched = Some(mic);
        }
    }

    pub fn mic_held_during_call(&self) -> Option<bool> {
        self.mic_held.lock().ok().and_then(|h| *h)
    }
}

#[async_trait]
impl TranscriptionClient for MockTranscriber {
    async fn transcribe(&self, payload: &AudioPayload) -> Result<Transcript, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let held = self
            .watched_mic
            .lock()
            .ok()
            .and_then(|m| m.as_ref().map(|mic| mic.is_held()));
        if let Ok(mut slot) = self.mic_held.lock() {
            *slot = held;
        }
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.reply.clone().map(|text| Transcript {
            text,
            language: Some("pt".to_string()),
            duration_secs: payload.duration_secs,
            provider: "mock".to_string(),
        })
    }

    fn name(&self) -> &str {
        "mock transcriber"
    }
}

// ---------- recognizer ----------

#[derive(Default)]
pub struct RecognizerTally {
    sender: Mutex<Option<mpsc::UnboundedSender<RecognizerEvent>>>,
    created: AtomicUsize,
    stopped: AtomicUsize,
    aborted: AtomicUsize,
    released: AtomicUsize,
}

impl RecognizerTally {
    /// Delivers an event as if the engine had emitted it.
    pub fn emit(&self, event: RecognizerEvent) {
        if let Ok(sender) = self.sender.lock() {
            if let Some(tx) = sender.as_ref() {
                let _ = tx.send(event);
            }
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

pub struct MockRecognizerFactory {
    available: bool,
    end_on_stop: bool,
    tally: Arc<RecognizerTally>,
}

impl MockRecognizerFactory {
    /// Recognizer that answers `stop` with `End`, like a healthy engine.
    pub fn new() -> (Arc<Self>, Arc<RecognizerTally>) {
        Self::build(true, true)
    }

    /// Recognizer that never emits `End` after `stop`.
    pub fn silent_on_stop() -> (Arc<Self>, Arc<RecognizerTally>) {
        Self::build(true, false)
    }

    pub fn unavailable() -> Arc<Self> {
        Self::build(false, true).0
    }

    fn build(available: bool, end_on_stop: bool) -> (Arc<Self>, Arc<RecognizerTally>) {
        let tally = Arc::new(RecognizerTally::default());
        let factory = Arc::new(Self {
            available,
            end_on_stop,
            tally: tally.clone(),
        });
        (factory, tally)
    }
}

impl RecognizerFactory for MockRecognizerFactory {
    fn create(&self, _options: &RecognizerOptions) -> Result<Box<dyn SpeechRecognizer>, CaptureError> {
        if !self.available {
            return Err(CaptureError::UnsupportedPlatform);
        }
        self.tally.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockRecognizer {
            end_on_stop: self.end_on_stop,
            tally: self.tally.clone(),
        }))
    }

    fn name(&self) -> &str {
        "mock recognizer"
    }
}

struct MockRecognizer {
    end_on_stop: bool,
    tally: Arc<RecognizerTally>,
}

impl SpeechRecognizer for MockRecognizer {
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<RecognizerEvent>, CaptureError> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut sender) = self.tally.sender.lock() {
            *sender = Some(tx);
        }
        Ok(rx)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.tally.stopped.fetch_add(1, Ordering::SeqCst);
        if self.end_on_stop {
            self.tally.emit(RecognizerEvent::End);
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.tally.aborted.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockRecognizer {
    fn drop(&mut self) {
        self.tally.released.fetch_add(1, Ordering::SeqCst);
    }
}
