//! Base trait and configuration for speech-to-text backends.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::codec::AudioClip;

/// Error types for transcription operations.
///
/// Every variant is isolated to the single utterance that triggered it;
/// the dispatcher logs and drops, it never tears down the session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SttError {
    #[error("network error: {0}")]
    Network(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("transcription timed out: {0}")]
    Timeout(String),

    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Configuration shared by STT backends.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SttConfig {
    /// API key for the remote backend.
    pub api_key: Option<String>,
    /// Language code, e.g. "en" or "en_us".
    pub language: String,
    /// Cache directory for local model artifacts.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Local model name (ggml convention, e.g. "ggml-base.en").
    pub model: String,
    /// Per-request timeout for remote calls, including polling.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Interval between remote status polls.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            language: "en_us".to_string(),
            cache_path: None,
            model: "ggml-base.en".to_string(),
            request_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
        }
    }
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// Which transcription backend a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttBackendKind {
    /// Remote upload-and-poll API.
    Remote,
    /// Local whisper.cpp inference.
    Local,
}

impl std::fmt::Display for SttBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SttBackendKind::Remote => write!(f, "remote"),
            SttBackendKind::Local => write!(f, "local"),
        }
    }
}

/// A speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// One-time provisioning (model download, artifact checks). Guarded so
    /// concurrent callers trigger at most one attempt. Default: nothing.
    async fn prepare(&self) -> Result<(), SttError> {
        Ok(())
    }

    /// Convert one finished utterance to text. An empty string means the
    /// backend heard nothing worth posting.
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, SttError>;

    fn name(&self) -> &'static str;
}
