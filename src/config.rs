use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{AudioSource, CaptureConstraints, ChunkConfig, DEFAULT_SILENCE_RMS_THRESHOLD};
use crate::session::{ControllerSettings, ErrorPolicy, SessionTimings, DEFAULT_SOFT_ERROR_MARKERS};

/// Environment overrides look like `VOICE_INTERVIEW__BACKEND__BASE_URL`
pub const ENV_PREFIX: &str = "VOICE_INTERVIEW";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    pub transport: TransportConfig,
    pub audio: AudioConfig,
    pub timing: SessionTimings,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-interview".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7410,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub nats_url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Preview chunk length
    pub chunk_ms: u64,
    /// Non-final chunks quieter than this are not sent
    pub silence_rms_threshold: f32,
    /// WAV file to stream instead of the microphone
    pub source: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_ms: 1000,
            silence_rms_threshold: DEFAULT_SILENCE_RMS_THRESHOLD,
            source: None,
        }
    }
}

impl AudioConfig {
    pub fn source(&self) -> AudioSource {
        match &self.source {
            Some(path) => AudioSource::File(path.clone()),
            None => AudioSource::Microphone,
        }
    }

    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            sample_rate: self.sample_rate,
            channels: self.channels,
            ..CaptureConstraints::default()
        }
    }

    pub fn chunk(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_duration_ms: self.chunk_ms,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Server errors containing any of these (case-insensitive) are not fatal
    pub soft_error_markers: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            soft_error_markers: DEFAULT_SOFT_ERROR_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load `path` (optional, any format `config` understands) and apply
    /// environment overrides on top
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            timings: self.timing.clone(),
            chunk: self.audio.chunk(),
            silence_threshold: self.audio.silence_rms_threshold,
            policy: ErrorPolicy::new(&self.policy.soft_error_markers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load("does/not/exist/voice-interview").unwrap();
        assert_eq!(config.service.name, "voice-interview");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.timing.silence_threshold_ms, 2500);
        assert_eq!(config.policy.soft_error_markers.len(), 2);
        assert_eq!(config.audio.source(), AudioSource::Microphone);
    }

    #[test]
    fn test_file_overrides_are_partial() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[backend]
base_url = "https://interviews.example.com"

[timing]
settle_ms = 250

[audio]
source = "fixtures/answer.wav"
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.backend.base_url, "https://interviews.example.com");
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.timing.settle_ms, 250);
        assert_eq!(config.timing.response_timeout_ms, 30_000);
        assert_eq!(
            config.audio.source(),
            AudioSource::File(PathBuf::from("fixtures/answer.wav"))
        );

        let settings = config.controller_settings();
        assert_eq!(settings.timings.settle(), Duration::from_millis(250));
        assert_eq!(settings.chunk.chunk_duration_ms, 1000);
    }
}
