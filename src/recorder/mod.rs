mod state;

pub use state::{RecorderSnapshot, RecorderState};

use crate::capture::{
    CaptureBackends, CaptureError, CaptureStrategy, ReleaseHandle, SessionEvents, StrategyKind,
    StrategySelector, TranscriptionResult,
};
use crate::config::RecorderConfig;
use crate::stt::TranscriptionError;
use crate::timer::DurationTimer;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Outcome = Option<Option<String>>;

/// Voice capture state machine: one session at a time, each ending in a
/// transcript, an error or nothing.
///
/// All public methods are infallible; failures land in the error slot.
pub struct RecorderController {
    inner: Arc<Mutex<Inner>>,
    selector: StrategySelector,
}

struct Inner {
    phase: Phase,
    error: Option<CaptureError>,
    timer: DurationTimer,
}

enum Phase {
    Idle,
    /// Acquisition in flight. Reported as idle but blocks another start.
    Starting {
        id: Uuid,
        cancel: watch::Sender<bool>,
    },
    Active(RecordingSession),
}

struct RecordingSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    kind: StrategyKind,
    /// `None` while a stop drives the strategy.
    strategy: Option<Box<dyn CaptureStrategy>>,
    /// Reaches the resource while a stop holds the strategy.
    release: Option<ReleaseHandle>,
    cancel: watch::Sender<bool>,
    outcome: Option<watch::Receiver<Outcome>>,
    transcribing: bool,
}

impl Inner {
    fn is_current(&self, id: Uuid) -> bool {
        match &self.phase {
            Phase::Idle => false,
            Phase::Starting { id: current, .. } => *current == id,
            Phase::Active(session) => session.id == id,
        }
    }

    fn state(&self) -> RecorderState {
        match &self.phase {
            Phase::Idle | Phase::Starting { .. } => RecorderState::Idle,
            Phase::Active(session) if session.transcribing => RecorderState::Transcribing,
            Phase::Active(_) => RecorderState::Recording,
        }
    }

    fn preview(&self) -> Option<String> {
        match &self.phase {
            Phase::Active(session) => session.strategy.as_ref()?.preview(),
            _ => None,
        }
    }
}

enum StopStep {
    Ignore,
    Join(watch::Receiver<Outcome>),
    Drive {
        id: Uuid,
        strategy: Box<dyn CaptureStrategy>,
        cancel: watch::Receiver<bool>,
        outcome: watch::Sender<Outcome>,
    },
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl RecorderController {
    pub fn new(config: &RecorderConfig, backends: CaptureBackends) -> Self {
        let tick = Duration::from_millis(config.tick_interval_ms.max(1));
        Self {
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                error: None,
                timer: DurationTimer::new(tick),
            })),
            selector: StrategySelector::new(config, backends),
        }
    }

    /// Controller backed by the HTTP transcription service from `config`.
    pub fn from_config(config: &RecorderConfig) -> Result<Self, TranscriptionError> {
        Ok(Self::new(config, CaptureBackends::from_config(config)?))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Begins a session. Ignored unless the recorder is idle.
    pub async fn start(&self) {
        let id = Uuid::new_v4();
        let Some(mut cancel) = self.begin_start(id) else {
            return;
        };
        let _cleanup = SessionCleanup {
            inner: &self.inner,
            id,
        };

        let mut strategy = match self.selector.select() {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!("No capture strategy available: {}", e);
                self.fail_start(id, e);
                return;
            }
        };
        debug!("Starting {:?} capture session {}", strategy.kind(), id);

        let events: Arc<dyn SessionEvents> = Arc::new(ControllerEvents {
            id,
            inner: Arc::downgrade(&self.inner),
        });
        let acquired = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => None,
            result = strategy.acquire(events) => Some(result),
        };

        match acquired {
            None => {
                strategy.abort();
                info!("Session {} cancelled while starting", id);
            }
            Some(Err(e)) => {
                strategy.abort();
                warn!("Error starting recording: {}", e);
                self.fail_start(id, e);
            }
            Some(Ok(())) => {
                if let Some(mut strategy) = self.activate(id, strategy) {
                    // Cancelled between acquisition and activation.
                    strategy.abort();
                    info!("Session {} cancelled while starting", id);
                }
            }
        }
    }

    fn begin_start(&self, id: Uuid) -> Option<watch::Receiver<bool>> {
        let mut inner = self.lock();
        if !matches!(inner.phase, Phase::Idle) {
            warn!("start() ignored: a session is already open");
            return None;
        }
        inner.error = None;
        let (cancel, cancel_rx) = watch::channel(false);
        inner.phase = Phase::Starting { id, cancel };
        Some(cancel_rx)
    }

    fn fail_start(&self, id: Uuid, error: CaptureError) {
        let mut inner = self.lock();
        if matches!(inner.phase, Phase::Starting { id: current, .. } if current == id) {
            inner.phase = Phase::Idle;
            inner.error = Some(error);
        }
    }

    /// Moves a starting session to recording. Hands the strategy back when
    /// the session is no longer current.
    fn activate(
        &self,
        id: Uuid,
        strategy: Box<dyn CaptureStrategy>,
    ) -> Option<Box<dyn CaptureStrategy>> {
        let mut inner = self.lock();
        let phase = std::mem::replace(&mut inner.phase, Phase::Idle);
        let cancel = match phase {
            Phase::Starting { id: current, cancel } if current == id => cancel,
            other => {
                inner.phase = other;
                return Some(strategy);
            }
        };

        let kind = strategy.kind();
        let release = strategy.release_handle();
        inner.phase = Phase::Active(RecordingSession {
            id,
            started_at: Utc::now(),
            kind,
            strategy: Some(strategy),
            release,
            cancel,
            outcome: None,
            transcribing: false,
        });
        inner.timer.start();
        info!("Recording started ({:?}, session {})", kind, id);
        None
    }

    /// Ends the session and returns its transcript. `None` when idle,
    /// cancelled, empty or failed (see [`Self::error`]).
    pub async fn stop(&self) -> Option<String> {
        match self.begin_stop() {
            StopStep::Ignore => None,
            StopStep::Join(outcome) => wait_outcome(outcome).await,
            StopStep::Drive {
                id,
                mut strategy,
                mut cancel,
                outcome,
            } => {
                let _cleanup = SessionCleanup {
                    inner: &self.inner,
                    id,
                };
                let result = tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel) => None,
                    result = strategy.finalize() => Some(result),
                };

                let text = match result {
                    None => {
                        strategy.abort();
                        info!("Session {} cancelled during stop", id);
                        None
                    }
                    Some(result) => self.finish_stop(id, result),
                };
                let _ = outcome.send(Some(text.clone()));
                text
            }
        }
    }

    fn begin_stop(&self) -> StopStep {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Phase::Active(session) = &mut inner.phase else {
            debug!("stop() ignored: not recording");
            return StopStep::Ignore;
        };
        if let Some(outcome) = &session.outcome {
            return StopStep::Join(outcome.clone());
        }
        let Some(strategy) = session.strategy.take() else {
            return StopStep::Ignore;
        };

        let (outcome, outcome_rx) = watch::channel(None);
        session.outcome = Some(outcome_rx);
        session.transcribing = session.kind.transcribes_remotely();
        let cancel = session.cancel.subscribe();
        let id = session.id;
        inner.timer.stop();
        info!(
            "Recording stopped after {}s (session {})",
            inner.timer.elapsed_secs(),
            id
        );

        StopStep::Drive {
            id,
            strategy,
            cancel,
            outcome,
        }
    }

    fn finish_stop(&self, id: Uuid, result: TranscriptionResult) -> Option<String> {
        let mut inner = self.lock();
        if !matches!(&inner.phase, Phase::Active(session) if session.id == id) {
            debug!("Discarding result of stale session {}", id);
            return None;
        }
        inner.phase = Phase::Idle;

        match result {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    info!("Session {} produced no speech", id);
                    None
                } else {
                    info!("Transcription complete: {} chars", text.len());
                    Some(text.to_string())
                }
            }
            Err(e) => {
                warn!("Error transcribing: {}", e);
                inner.error = Some(e);
                None
            }
        }
    }

    /// Abandons the current session, discarding partial data.
    pub fn cancel(&self) {
        let released = {
            let mut inner = self.lock();
            let phase = std::mem::replace(&mut inner.phase, Phase::Idle);
            if matches!(phase, Phase::Idle) {
                return;
            }
            inner.timer.reset();
            inner.error = None;
            phase
        };

        match released {
            Phase::Idle => {}
            Phase::Starting { id, cancel } => {
                let _ = cancel.send(true);
                info!("Recording cancelled while starting (session {})", id);
            }
            Phase::Active(mut session) => {
                let _ = session.cancel.send(true);
                match session.strategy.take() {
                    Some(mut strategy) => strategy.abort(),
                    // A stop is driving the strategy; release underneath it.
                    None => {
                        if let Some(release) = &session.release {
                            release.release();
                        }
                    }
                }
                info!("Recording cancelled (session {})", session.id);
            }
        }
    }

    pub fn state(&self) -> RecorderState {
        self.lock().state()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    pub fn is_transcribing(&self) -> bool {
        self.state() == RecorderState::Transcribing
    }

    /// Whole seconds recorded in the current or last session.
    pub fn recording_duration(&self) -> u64 {
        self.lock().timer.elapsed_secs()
    }

    /// User-facing message of the last failure.
    pub fn error(&self) -> Option<String> {
        self.lock().error.as_ref().map(|e| e.to_string())
    }

    pub fn last_error(&self) -> Option<CaptureError> {
        self.lock().error.clone()
    }

    /// Interim text of a live session.
    pub fn preview(&self) -> Option<String> {
        self.lock().preview()
    }

    /// All observables, read under one lock.
    pub fn snapshot(&self) -> RecorderSnapshot {
        let inner = self.lock();
        let state = inner.state();
        RecorderSnapshot {
            state,
            is_recording: state == RecorderState::Recording,
            is_transcribing: state == RecorderState::Transcribing,
            recording_duration: inner.timer.elapsed_secs(),
            error: inner.error.as_ref().map(|e| e.to_string()),
            preview: inner.preview(),
        }
    }

    pub fn has_session(&self) -> bool {
        matches!(self.lock().phase, Phase::Active(_))
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match &self.lock().phase {
            Phase::Active(session) => Some(session.id),
            _ => None,
        }
    }

    pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
        match &self.lock().phase {
            Phase::Active(session) => Some(session.started_at),
            _ => None,
        }
    }

    /// Strategy kind the next `start()` would use.
    pub fn strategy_kind(&self) -> Result<StrategyKind, CaptureError> {
        self.selector.resolve()
    }
}

impl Drop for RecorderController {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Returns a starting or stopping session to idle when its future is
/// dropped before completing.
struct SessionCleanup<'a> {
    inner: &'a Mutex<Inner>,
    id: Uuid,
}

impl Drop for SessionCleanup<'_> {
    fn drop(&mut self) {
        let mut inner = lock(self.inner);
        let abandoned = match &inner.phase {
            Phase::Starting { id, .. } => *id == self.id,
            Phase::Active(session) => session.id == self.id && session.strategy.is_none(),
            Phase::Idle => false,
        };
        if abandoned {
            debug!("Session {} abandoned mid-operation", self.id);
            inner.phase = Phase::Idle;
            inner.timer.stop();
        }
    }
}

/// Session callbacks handed to strategies. Holds the controller weakly so a
/// lingering background task cannot keep it alive.
struct ControllerEvents {
    id: Uuid,
    inner: Weak<Mutex<Inner>>,
}

impl SessionEvents for ControllerEvents {
    fn is_current(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| lock(&inner).is_current(self.id))
            .unwrap_or(false)
    }

    fn report_error(&self, error: CaptureError) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut inner = lock(&inner);
        if inner.is_current(self.id) {
            inner.error = Some(error);
        }
    }

    fn ended(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let released = {
            let mut inner = lock(&inner);
            let phase = std::mem::replace(&mut inner.phase, Phase::Idle);
            match phase {
                // No stop in flight: the engine quit on its own.
                Phase::Active(session) if session.id == self.id && session.strategy.is_some() => {
                    inner.timer.stop();
                    Some(session)
                }
                // Dropping the cancel sender aborts the pending start.
                Phase::Starting { id, .. } if id == self.id => None,
                other => {
                    inner.phase = other;
                    None
                }
            }
        };

        if let Some(mut session) = released {
            if let Some(mut strategy) = session.strategy.take() {
                strategy.abort();
            }
            info!("Recognition ended on its own, session {} closed", self.id);
        }
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

async fn wait_outcome(mut outcome: watch::Receiver<Outcome>) -> Option<String> {
    match outcome.wait_for(|o| o.is_some()).await {
        Ok(value) => value.clone().flatten(),
        Err(_) => None,
    }
}
