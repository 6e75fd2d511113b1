use serde::{Deserialize, Serialize};

/// Interleaved 16-bit PCM accumulated while a recording is open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Cached duration in seconds
    #[serde(skip)]
    pub duration_secs: f32,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            channels,
            duration_secs: 0.0,
        }
    }

    fn update_duration(&mut self) {
        if self.sample_rate == 0 {
            self.duration_secs = 0.0;
        } else {
            let channels = self.channels.max(1) as f32;
            self.duration_secs = self.samples.len() as f32 / (self.sample_rate as f32 * channels);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.duration_secs = 0.0;
    }

    pub fn append(&mut self, data: &[i16]) {
        self.samples.extend_from_slice(data);
        self.update_duration();
    }

    /// Converts float samples in [-1.0, 1.0] and appends them.
    pub fn append_f32(&mut self, data: &[f32]) {
        self.samples.extend(
            data.iter()
                .map(|&x| (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
        );
        self.update_duration();
    }

    /// Moves the accumulated samples out, leaving an empty buffer with the
    /// same format behind.
    pub fn take(&mut self) -> AudioBuffer {
        let out = self.clone();
        self.clear();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_sample_count() {
        let mut buffer = AudioBuffer::new(16_000, 1);
        buffer.append(&vec![0i16; 8_000]);
        assert!((buffer.duration_secs - 0.5).abs() < f32::EPSILON);

        // stereo halves the duration of the same sample count
        let mut stereo = AudioBuffer::new(16_000, 2);
        stereo.append(&vec![0i16; 8_000]);
        assert!((stereo.duration_secs - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn take_leaves_empty_buffer_with_format() {
        let mut buffer = AudioBuffer::new(48_000, 2);
        buffer.append_f32(&[0.5, -0.5, 2.0, -2.0]);

        let taken = buffer.take();
        assert_eq!(taken.samples.len(), 4);
        assert_eq!(taken.samples[2], i16::MAX);
        assert!(buffer.is_empty());
        assert_eq!(buffer.sample_rate, 48_000);
        assert_eq!(buffer.duration_secs, 0.0);
    }
}
