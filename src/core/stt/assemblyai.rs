//! AssemblyAI transcription backend (remote upload-and-poll variant).
//!
//! One utterance becomes one transcript job: the samples are rendered to a
//! WAV temp file, uploaded, and the job is polled until it completes. The
//! temp file is scope-owned, so it is removed on success and on every
//! failure path alike.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::base::{SttConfig, SttError, Transcriber};
use crate::core::codec::{self, AudioClip};

const API_BASE_URL: &str = "https://api.assemblyai.com/v2";

/// Remote transcription backend against the AssemblyAI v2 API.
pub struct AssemblyAiStt {
    api_key: String,
    language: String,
    poll_interval: Duration,
    request_timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptStatus {
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl AssemblyAiStt {
    pub fn new(config: &SttConfig) -> Result<Self, SttError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                SttError::Configuration("AssemblyAI API key is not configured".to_string())
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SttError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            api_key,
            language: config.language.clone(),
            poll_interval: config.poll_interval,
            request_timeout: config.request_timeout,
            client,
        })
    }

    async fn upload(&self, wav: Vec<u8>) -> Result<String, SttError> {
        let response = self
            .client
            .post(format!("{API_BASE_URL}/upload"))
            .header("authorization", &self.api_key)
            .body(wav)
            .send()
            .await
            .map_err(|e| SttError::Network(format!("upload: {e}")))?;

        if !response.status().is_success() {
            return Err(SttError::Backend(format!(
                "upload rejected with status {}",
                response.status()
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| SttError::Backend(format!("upload response: {e}")))?;
        Ok(body.upload_url)
    }

    async fn create_job(&self, audio_url: &str) -> Result<String, SttError> {
        let response = self
            .client
            .post(format!("{API_BASE_URL}/transcript"))
            .header("authorization", &self.api_key)
            .json(&serde_json::json!({
                "audio_url": audio_url,
                "language_code": self.language,
                "speaker_labels": false,
            }))
            .send()
            .await
            .map_err(|e| SttError::Network(format!("create transcript: {e}")))?;

        if !response.status().is_success() {
            return Err(SttError::Backend(format!(
                "transcript creation rejected with status {}",
                response.status()
            )));
        }

        let body: CreateResponse = response
            .json()
            .await
            .map_err(|e| SttError::Backend(format!("create response: {e}")))?;
        Ok(body.id)
    }

    async fn poll_until_done(&self, id: &str) -> Result<String, SttError> {
        loop {
            let response = self
                .client
                .get(format!("{API_BASE_URL}/transcript/{id}"))
                .header("authorization", &self.api_key)
                .send()
                .await
                .map_err(|e| SttError::Network(format!("poll: {e}")))?;

            let status: TranscriptStatus = response
                .json()
                .await
                .map_err(|e| SttError::Backend(format!("poll response: {e}")))?;

            match status.status.as_str() {
                "completed" => return Ok(status.text.unwrap_or_default()),
                "error" => {
                    return Err(SttError::Backend(
                        status.error.unwrap_or_else(|| "unknown backend error".into()),
                    ));
                }
                other => {
                    debug!(transcript = id, status = other, "transcription pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl Transcriber for AssemblyAiStt {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, SttError> {
        if clip.is_empty() {
            return Ok(String::new());
        }

        let wav = codec::render_wav(&clip.samples, clip.sample_rate, clip.channels)
            .map_err(|e| SttError::InvalidAudio(e.to_string()))?;

        // Render through a scoped temp file: it is deleted when `rendered`
        // drops, on success and on every error return alike.
        let rendered = tempfile::NamedTempFile::new()
            .map_err(|e| SttError::InvalidAudio(format!("temp file: {e}")))?;
        std::fs::write(rendered.path(), &wav)
            .map_err(|e| SttError::InvalidAudio(format!("temp write: {e}")))?;
        let payload = tokio::fs::read(rendered.path())
            .await
            .map_err(|e| SttError::InvalidAudio(format!("temp read: {e}")))?;

        let job = async {
            let audio_url = self.upload(payload).await?;
            let id = self.create_job(&audio_url).await?;
            self.poll_until_done(&id).await
        };

        let text = tokio::time::timeout(self.request_timeout, job)
            .await
            .map_err(|_| {
                SttError::Timeout(format!(
                    "no completion within {:?}",
                    self.request_timeout
                ))
            })??;

        Ok(text.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "assemblyai"
    }
}
