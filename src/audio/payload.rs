use super::AudioBuffer;

/// Mime types the transcription service accepts.
pub const RECOGNIZED_MIME_TYPES: &[&str] = &[
    "audio/webm",
    "audio/wav",
    "audio/mp3",
    "audio/mpeg",
    "audio/mp4",
    "audio/m4a",
    "audio/ogg",
    "audio/flac",
    "application/octet-stream",
];

/// A complete, finished audio clip ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub duration_secs: f32,
}

impl AudioPayload {
    pub fn new(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        duration_secs: f32,
    ) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name: file_name.into(),
            duration_secs,
        }
    }

    /// Encodes a PCM buffer as a WAV clip. A buffer without samples yields an
    /// empty payload rather than a header-only file.
    pub fn from_buffer(buffer: &AudioBuffer) -> Self {
        let bytes = if buffer.is_empty() {
            Vec::new()
        } else {
            encode_wav(buffer)
        };
        Self::new(bytes, "audio/wav", "recording.wav", buffer.duration_secs)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() || self.duration_secs <= 0.0
    }

    pub fn has_recognized_mime(&self) -> bool {
        RECOGNIZED_MIME_TYPES.contains(&self.mime_type.as_str())
    }
}

/// Convert AudioBuffer to 16-bit PCM WAV bytes
pub fn encode_wav(audio: &AudioBuffer) -> Vec<u8> {
    let sample_rate = audio.sample_rate;
    let channels = audio.channels.max(1);
    let samples = &audio.samples;

    let mut wav = Vec::with_capacity(44 + samples.len() * 2);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    let file_size = (36 + samples.len() * 2) as u32;
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * channels as u32 * 2;
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&(channels * 2).to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    let data_size = (samples.len() * 2) as u32;
    wav.extend_from_slice(&data_size.to_le_bytes());

    for &sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}
