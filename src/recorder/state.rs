use serde::Serialize;

/// Public lifecycle of the recorder. Errors are attached, never a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Transcribing,
}

impl RecorderState {
    pub fn as_str(self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Transcribing => "transcribing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderSnapshot {
    pub state: RecorderState,
    pub is_recording: bool,
    pub is_transcribing: bool,
    pub recording_duration: u64,
    pub error: Option<String>,
    pub preview: Option<String>,
}
