use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Counts whole seconds while a capture session is recording.
pub struct DurationTimer {
    elapsed: Arc<AtomicU64>,
    tick: Duration,
    task: Option<JoinHandle<()>>,
}

impl DurationTimer {
    pub fn new(tick: Duration) -> Self {
        Self {
            elapsed: Arc::new(AtomicU64::new(0)),
            tick,
            task: None,
        }
    }

    /// Restarts from zero. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        self.stop();
        self.elapsed.store(0, Ordering::Relaxed);

        let elapsed = self.elapsed.clone();
        let tick = self.tick;
        self.task = Some(tokio::spawn(async move {
            loop {
                sleep(tick).await;
                elapsed.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    /// Freezes the count at the last tick.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn reset(&mut self) {
        self.stop();
        self.elapsed.store(0, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }
}

impl Default for DurationTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
