use super::RecognitionSegment;

/// Running transcript of a live session.
///
/// Only final segments make it into [`final_text`](Self::final_text); interim
/// segments feed the preview and are replaced on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    final_text: String,
    interim_text: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the buffer from the engine's cumulative result list.
    pub fn apply(&mut self, segments: &[RecognitionSegment]) {
        let mut finals = Vec::new();
        let mut interims = Vec::new();
        for segment in segments {
            let text = segment.transcript.trim();
            if text.is_empty() {
                continue;
            }
            if segment.is_final {
                finals.push(text);
            } else {
                interims.push(text);
            }
        }
        self.final_text = finals.join(" ");
        self.interim_text = interims.join(" ");
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    pub fn preview(&self) -> String {
        match (self.final_text.is_empty(), self.interim_text.is_empty()) {
            (_, true) => self.final_text.clone(),
            (true, false) => self.interim_text.clone(),
            (false, false) => format!("{} {}", self.final_text, self.interim_text),
        }
    }

    pub fn clear(&mut self) {
        self.final_text.clear();
        self.interim_text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interim_text_only_reaches_preview() {
        let mut buffer = TranscriptBuffer::new();
        buffer.apply(&[
            RecognitionSegment::final_text("estou com"),
            RecognitionSegment::interim("dor de"),
        ]);

        assert_eq!(buffer.final_text(), "estou com");
        assert_eq!(buffer.preview(), "estou com dor de");
    }

    #[test]
    fn later_results_replace_earlier_interims() {
        let mut buffer = TranscriptBuffer::new();
        buffer.apply(&[RecognitionSegment::interim("dor")]);
        assert_eq!(buffer.final_text(), "");
        assert_eq!(buffer.preview(), "dor");

        buffer.apply(&[RecognitionSegment::final_text(" dor de cabeça ")]);
        assert_eq!(buffer.final_text(), "dor de cabeça");
        assert_eq!(buffer.preview(), "dor de cabeça");
    }

    #[test]
    fn clear_discards_everything() {
        let mut buffer = TranscriptBuffer::new();
        buffer.apply(&[
            RecognitionSegment::final_text("febre"),
            RecognitionSegment::interim("alta"),
        ]);
        buffer.clear();
        assert_eq!(buffer, TranscriptBuffer::default());
    }
}
