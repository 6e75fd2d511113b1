use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::capture::{CaptureMode, Platform};
use crate::stt::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS};

pub const DEFAULT_LANGUAGE: &str = "pt-BR";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";
pub const DEFAULT_FINALIZE_GRACE_MS: u64 = 1_500;
pub const DEFAULT_TICK_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// `None` detects the platform from the build target.
    pub platform: Option<Platform>,
    pub capture_mode: CaptureMode,
    pub language: String,
    pub input_device_name: Option<String>,
    /// How long a live stop waits for the recognizer's end event.
    pub live_finalize_grace_ms: u64,
    pub tick_interval_ms: u64,
    pub transcription: TranscriptionConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            platform: None,
            capture_mode: CaptureMode::Auto,
            language: DEFAULT_LANGUAGE.to_string(),
            input_device_name: None,
            live_finalize_grace_ms: DEFAULT_FINALIZE_GRACE_MS,
            tick_interval_ms: DEFAULT_TICK_MS,
            transcription: TranscriptionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            auth_token: None,
        }
    }
}

impl RecorderConfig {
    /// Defaults overridden by the process environment (and `.env`, if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Applies `VOICE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = lookup("VOICE_BACKEND_URL").or_else(|| lookup("EXPO_PUBLIC_BACKEND_URL")) {
            self.transcription.base_url = url;
        }
        if let Some(token) = lookup("VOICE_AUTH_TOKEN") {
            self.transcription.auth_token = Some(token);
        }
        if let Some(timeout) = lookup("VOICE_TRANSCRIBE_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.transcription.timeout_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid VOICE_TRANSCRIBE_TIMEOUT_SECS '{}'", timeout),
            }
        }
        if let Some(mode) = lookup("VOICE_CAPTURE_MODE") {
            self.capture_mode = CaptureMode::parse(&mode);
        }
        if let Some(platform) = lookup("VOICE_PLATFORM") {
            self.platform = Platform::parse(&platform);
        }
        if let Some(language) = lookup("VOICE_LANGUAGE") {
            self.language = language;
        }
        normalize_config(self);
    }

    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::current)
    }
}

pub fn normalize_language(input: &str) -> String {
    let trimmed = input.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "pt" | "pt-br" | "pt_br" => DEFAULT_LANGUAGE.to_string(),
        "en" | "en-us" | "en_us" => "en-US".to_string(),
        _ => trimmed.to_string(),
    }
}

fn normalize_config(config: &mut RecorderConfig) {
    config.language = normalize_language(&config.language);
    config.input_device_name = config
        .input_device_name
        .take()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if config.transcription.timeout_secs == 0 {
        config.transcription.timeout_secs = DEFAULT_TIMEOUT_SECS;
    }
    if config.transcription.endpoint.trim().is_empty() {
        config.transcription.endpoint = DEFAULT_ENDPOINT.to_string();
    }
    if config.tick_interval_ms == 0 {
        config.tick_interval_ms = DEFAULT_TICK_MS;
    }
    config.transcription.auth_token = config
        .transcription
        .auth_token
        .take()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
}

/// Reads the config file, falling back to defaults when it is missing. A file
/// that fails to parse is kept as `.json.bak` and replaced by defaults.
pub fn load_or_default(path: &Path) -> Result<RecorderConfig, String> {
    if !path.exists() {
        return Ok(RecorderConfig::default());
    }

    let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
    match serde_json::from_str::<RecorderConfig>(&raw) {
        Ok(mut config) => {
            normalize_config(&mut config);
            Ok(config)
        }
        Err(e) => {
            tracing::warn!("Config at {} is invalid ({}), using defaults", path.display(), e);
            let backup = path.with_extension("json.bak");
            let _ = fs::copy(path, backup);
            let config = RecorderConfig::default();
            save(path, &config)?;
            Ok(config)
        }
    }
}

pub fn save(path: &Path, config: &RecorderConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
    }
    let raw = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config: {}", e))
}
