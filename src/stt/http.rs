// src/stt/http.rs
// Backend transcription endpoint client (multipart upload)

use super::{TranscriptionClient, TranscriptionError, Transcript};
use crate::audio::AudioPayload;
use crate::config::TranscriptionConfig;
use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "/api/transcribe";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Largest clip the service accepts.
pub const MAX_PAYLOAD_BYTES: usize = 25 * 1024 * 1024;
const AUDIO_FIELD: &str = "audio";

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

pub struct HttpTranscriptionClient {
    url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpTranscriptionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranscriptionError::NetworkError(e.to_string()))?;

        let url = join_url(base_url, DEFAULT_ENDPOINT);
        tracing::info!("Transcription client initialized: {}", url);

        Ok(Self {
            url,
            auth_token: None,
            client,
        })
    }

    pub fn from_config(config: &TranscriptionConfig) -> Result<Self, TranscriptionError> {
        let client = Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))?
            .with_endpoint(&config.base_url, &config.endpoint);
        Ok(match config.auth_token.as_deref() {
            Some(token) => client.with_auth_token(token),
            None => client,
        })
    }

    pub fn with_endpoint(mut self, base_url: &str, endpoint: &str) -> Self {
        self.url = join_url(base_url, endpoint);
        self
    }

    pub fn with_auth_token(mut self, token: &str) -> Self {
        let token = token.trim();
        self.auth_token = (!token.is_empty()).then(|| token.to_string());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn clean_transcript(text: &str) -> String {
        static TS_RE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = TS_RE.get_or_init(|| Regex::new(r"\[\d{2}:\d{2}.*?\]|\(\d{2}:\d{2}\)").ok());
        let stripped = match re {
            Some(re) => re.replace_all(text, "").into_owned(),
            None => text.to_string(),
        };
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn error_message(status: reqwest::StatusCode, body: &str) -> String {
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
        let detail = match parsed.detail {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        detail
            .or(parsed.message)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
    }
}

#[async_trait]
impl TranscriptionClient for HttpTranscriptionClient {
    async fn transcribe(&self, payload: &AudioPayload) -> Result<Transcript, TranscriptionError> {
        if payload.is_empty() {
            return Err(TranscriptionError::EmptyAudio);
        }
        if payload.bytes.len() > MAX_PAYLOAD_BYTES {
            tracing::warn!(
                "Audio payload too large: {} bytes > {} bytes",
                payload.bytes.len(),
                MAX_PAYLOAD_BYTES
            );
            return Err(TranscriptionError::PayloadTooLarge {
                size: payload.bytes.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }
        if !payload.has_recognized_mime() {
            tracing::warn!("Unrecognized audio type: {}", payload.mime_type);
        }

        tracing::info!(
            "Transcribing {:.1}s clip ({} bytes, {})",
            payload.duration_secs,
            payload.bytes.len(),
            payload.mime_type
        );

        let file_part = multipart::Part::bytes(payload.bytes.clone())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.mime_type)
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;
        let form = multipart::Form::new().part(AUDIO_FIELD, file_part);

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(token) = self.auth_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Err(TranscriptionError::TimeoutError),
            Err(e) => return Err(TranscriptionError::NetworkError(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = Self::error_message(status, &body);
            tracing::warn!("Transcription service returned {}: {}", status, message);
            return Err(TranscriptionError::ServiceError {
                status: status.as_u16(),
                message,
            });
        }

        let body: TranscribeResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                TranscriptionError::TimeoutError
            } else {
                TranscriptionError::InvalidResponse(e.to_string())
            }
        })?;

        let text = Self::clean_transcript(&body.text);
        tracing::info!("Transcription success: {} chars", text.len());

        Ok(Transcript {
            text,
            language: body.language,
            duration_secs: payload.duration_secs,
            provider: "backend".to_string(),
        })
    }

    fn name(&self) -> &str {
        "Backend Whisper"
    }
}

fn join_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base, endpoint.trim_start_matches('/'))
}
