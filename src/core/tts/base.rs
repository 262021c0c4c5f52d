//! Base trait and configuration for text-to-speech backends.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Error types for synthesis operations. One failed item is logged and
/// skipped; the playback consumer keeps going.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TtsError {
    #[error("nothing to synthesize")]
    EmptyText,

    #[error("network error: {0}")]
    Network(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Configuration shared by TTS backends.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TtsConfig {
    /// Language code for synthesis, e.g. "en".
    pub language: String,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            request_timeout: Duration::from_secs(15),
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

/// A text-to-speech backend: text in, compressed audio bytes out.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Bytes, TtsError>;

    fn name(&self) -> &'static str;
}
