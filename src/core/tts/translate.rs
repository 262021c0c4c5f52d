//! Google Translate TTS backend.
//!
//! The unofficial `translate_tts` endpoint: a single GET with the text
//! URL-escaped, answering MP3 bytes. No credentials required.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use super::base::{Synthesizer, TtsConfig, TtsError};

const TRANSLATE_TTS_URL: &str = "https://translate.google.com/translate_tts";

pub struct TranslateTts {
    language: String,
    client: reqwest::Client,
}

impl TranslateTts {
    pub fn new(config: &TtsConfig) -> Result<Self, TtsError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TtsError::Backend(format!("http client: {e}")))?;
        Ok(Self {
            language: config.language.clone(),
            client,
        })
    }

    fn request_url(&self, text: &str) -> Result<Url, TtsError> {
        Url::parse_with_params(
            TRANSLATE_TTS_URL,
            &[
                ("tl", self.language.as_str()),
                ("client", "tw-ob"),
                ("q", text),
            ],
        )
        .map_err(|e| TtsError::Backend(format!("request url: {e}")))
    }
}

#[async_trait]
impl Synthesizer for TranslateTts {
    async fn synthesize(&self, text: &str) -> Result<Bytes, TtsError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TtsError::EmptyText);
        }

        let url = self.request_url(text)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TtsError::Backend(format!(
                "synthesis rejected with status {}",
                response.status()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;
        if audio.is_empty() {
            return Err(TtsError::Backend("empty synthesis payload".to_string()));
        }
        Ok(audio)
    }

    fn name(&self) -> &'static str {
        "google-translate"
    }
}
