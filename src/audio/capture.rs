use super::{AudioBuffer, AudioPayload, Microphone, PermissionStatus, RecordingHandle, RecordingOptions};
use crate::capture::CaptureError;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{mpsc, Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{error, info};

/// Native microphone backed by the default cpal host.
///
/// The cpal stream lives on its own thread for the whole recording, so the
/// handle handed to the strategy is `Send` on every host.
#[derive(Debug, Default)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn request_permission(&self) -> PermissionStatus {
        // Desktop hosts grant access at the OS level; a missing device is
        // reported by `open`.
        PermissionStatus::Granted
    }

    async fn open(&self, options: &RecordingOptions) -> Result<Box<dyn RecordingHandle>, CaptureError> {
        let buffer = Arc::new(Mutex::new(AudioBuffer::new(
            options.preferred_sample_rate,
            options.preferred_channels,
        )));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel();
        let (closed_tx, closed_rx) = oneshot::channel();

        let thread_buffer = buffer.clone();
        let preferred = options.clone();
        std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_stream(&preferred, thread_buffer, ready_tx, stop_rx, closed_tx))
            .map_err(|e| CaptureError::StartFailed(e.to_string()))?;

        // The thread exits on its own after reporting a failure.
        match ready_rx.await {
            Ok(Ok(device_name)) => {
                info!("Input device: {}", device_name);
                Ok(Box::new(CpalRecording {
                    stop_tx: Some(stop_tx),
                    closed_rx: Some(closed_rx),
                    buffer,
                }))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::StartFailed(
                "capture thread exited before the stream started".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

struct CpalRecording {
    stop_tx: Option<mpsc::Sender<()>>,
    /// Fires once the capture thread has dropped the stream.
    closed_rx: Option<oneshot::Receiver<()>>,
    buffer: Arc<Mutex<AudioBuffer>>,
}

impl CpalRecording {
    fn release(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

#[async_trait]
impl RecordingHandle for CpalRecording {
    async fn finish(mut self: Box<Self>) -> Result<AudioPayload, CaptureError> {
        self.release();
        if let Some(closed_rx) = self.closed_rx.take() {
            if closed_rx.await.is_err() {
                error!("Capture thread exited without closing the stream");
            }
        }
        let buffer = self
            .buffer
            .lock()
            .map_err(|e| CaptureError::StartFailed(e.to_string()))?
            .take();
        info!("Recording finished: {:.1}s captured", buffer.duration_secs);
        Ok(AudioPayload::from_buffer(&buffer))
    }

    fn discard(mut self: Box<Self>) {
        self.release();
        if let Ok(mut guard) = self.buffer.lock() {
            guard.clear();
        }
    }
}

impl Drop for CpalRecording {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_stream(
    options: &RecordingOptions,
    buffer: Arc<Mutex<AudioBuffer>>,
    ready_tx: oneshot::Sender<Result<String, CaptureError>>,
    stop_rx: mpsc::Receiver<()>,
    closed_tx: oneshot::Sender<()>,
) {
    let host = cpal::default_host();
    let Some(device) = pick_input_device(&host, options.input_device_name.as_deref()) else {
        let _ = ready_tx.send(Err(CaptureError::UnsupportedPlatform));
        return;
    };
    let device_name = device_display_name(&device);

    let stream = match build_stream(&device, options, &buffer) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(CaptureError::StartFailed(e)));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::StartFailed(e.to_string())));
        return;
    }
    if ready_tx.send(Ok(device_name)).is_err() {
        return;
    }

    // Blocks until the handle is finished, discarded or dropped.
    let _ = stop_rx.recv();
    drop(stream);
    let _ = closed_tx.send(());
}

/// Picks a speech-friendly config (preferred rate and channel count) among
/// the ranges the device supports.
fn preferred_config(
    ranges: impl IntoIterator<Item = cpal::SupportedStreamConfigRange>,
    options: &RecordingOptions,
) -> Option<cpal::SupportedStreamConfig> {
    let rate = options.preferred_sample_rate;
    ranges
        .into_iter()
        .filter(|r| matches!(r.sample_format(), cpal::SampleFormat::I16 | cpal::SampleFormat::F32))
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .min_by_key(|r| r.channels().abs_diff(options.preferred_channels))
        .map(|r| r.with_sample_rate(rate))
}

fn build_stream(
    device: &cpal::Device,
    options: &RecordingOptions,
    buffer: &Arc<Mutex<AudioBuffer>>,
) -> Result<cpal::Stream, String> {
    let supported = device
        .supported_input_configs()
        .ok()
        .and_then(|ranges| preferred_config(ranges, options));
    let config = match supported {
        Some(config) => config,
        None => device.default_input_config().map_err(|e| e.to_string())?,
    };
    if let Ok(mut guard) = buffer.lock() {
        guard.sample_rate = config.sample_rate();
        guard.channels = config.channels();
        guard.clear();
    }

    let buffer_clone = buffer.clone();
    let err_fn = |err| error!("an error occurred on stream: {}", err);

    match config.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _: &_| {
                if let Ok(mut guard) = buffer_clone.lock() {
                    guard.append(data);
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &_| {
                if let Ok(mut guard) = buffer_clone.lock() {
                    guard.append_f32(data);
                }
            },
            err_fn,
            None,
        ),
        _ => return Err("Unsupported sample format".into()),
    }
    .map_err(|e| e.to_string())
}

fn pick_input_device(host: &cpal::Host, preferred_name: Option<&str>) -> Option<cpal::Device> {
    if let Some(name) = preferred_name {
        if let Ok(mut devices) = host.input_devices() {
            if let Some(device) = devices.find(|d| device_display_name(d) == name) {
                return Some(device);
            }
        }
        tracing::warn!(
            "Preferred input device '{}' not found, falling back to default",
            name
        );
    }

    let default_device = host.default_input_device()?;
    let default_name = device_display_name(&default_device);
    if !looks_like_loopback(&default_name) {
        return Some(default_device);
    }

    tracing::warn!(
        "Default device '{}' looks like loopback, trying to pick a microphone input",
        default_name
    );

    if let Ok(mut devices) = host.input_devices() {
        if let Some(alternative) = devices.find(|d| !looks_like_loopback(&device_display_name(d))) {
            return Some(alternative);
        }
    }

    Some(default_device)
}

fn device_display_name(device: &cpal::Device) -> String {
    device
        .name()
        .or_else(|_| device.description().map(|d| d.name().to_string()))
        .unwrap_or_else(|_| "Unknown input".to_string())
}

fn looks_like_loopback(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ["stereo mix", "what u hear", "wave out", "loopback", "monitor"]
        .iter()
        .any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(channels: u16, min: u32, max: u32, format: cpal::SampleFormat) -> cpal::SupportedStreamConfigRange {
        cpal::SupportedStreamConfigRange::new(
            channels,
            min,
            max,
            cpal::SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn prefers_mono_16k_when_supported() {
        let ranges = vec![
            range(2, 44_100, 48_000, cpal::SampleFormat::F32),
            range(2, 8_000, 48_000, cpal::SampleFormat::F32),
            range(1, 8_000, 48_000, cpal::SampleFormat::I16),
        ];
        let config = preferred_config(ranges, &RecordingOptions::default()).unwrap();
        assert_eq!(config.channels(), 1);
        assert_eq!(config.sample_rate(), 16_000);
        assert_eq!(config.sample_format(), cpal::SampleFormat::I16);
    }

    #[test]
    fn unsupported_rate_falls_back_to_device_default() {
        let ranges = vec![range(2, 44_100, 48_000, cpal::SampleFormat::F32)];
        assert!(preferred_config(ranges, &RecordingOptions::default()).is_none());
    }

    #[tokio::test]
    async fn finish_waits_for_the_stream_to_close() {
        let buffer = Arc::new(Mutex::new(AudioBuffer::new(16_000, 1)));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (closed_tx, closed_rx) = oneshot::channel();

        let thread_buffer = buffer.clone();
        std::thread::spawn(move || {
            let _ = stop_rx.recv();
            // Samples delivered while the stream shuts down.
            std::thread::sleep(std::time::Duration::from_millis(50));
            thread_buffer.lock().unwrap().append(&[100i16; 1_600]);
            let _ = closed_tx.send(());
        });

        let recording = Box::new(CpalRecording {
            stop_tx: Some(stop_tx),
            closed_rx: Some(closed_rx),
            buffer,
        });
        let payload = recording.finish().await.unwrap();
        assert!(!payload.is_empty());
        assert!((payload.duration_secs - 0.1).abs() < 1e-3);
    }

    #[test]
    fn loopback_names_are_detected() {
        assert!(looks_like_loopback("Monitor of Built-in Audio"));
        assert!(looks_like_loopback("Stereo Mix (Realtek)"));
        assert!(!looks_like_loopback("USB Microphone"));
    }
}
