//! Local Whisper transcription backend (whisper.cpp via `whisper-rs`).
//!
//! Inference runs on-device against a ggml model; no API key is needed.
//! The model file is provisioned on first use (see [`super::assets`]) and
//! loaded once per backend instance. Audio is converted to the 16 kHz mono
//! f32 layout whisper.cpp expects before inference.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::assets;
use super::base::{SttConfig, SttError, Transcriber};
use crate::core::codec::{AudioClip, resample};

/// Sample rate whisper.cpp expects.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Local inference backend. The loaded model is shared across concurrent
/// transcriptions; each call gets its own inference state.
pub struct WhisperStt {
    config: SttConfig,
    engine: OnceCell<Arc<Engine>>,
}

struct Engine {
    context: WhisperContext,
}

impl WhisperStt {
    pub fn new(config: &SttConfig) -> Result<Self, SttError> {
        if config.cache_path.is_none() {
            return Err(SttError::Configuration(
                "cache path must be set for local transcription".to_string(),
            ));
        }
        Ok(Self {
            config: config.clone(),
            engine: OnceCell::new(),
        })
    }

    async fn engine(&self) -> Result<Arc<Engine>, SttError> {
        self.engine
            .get_or_try_init(|| async {
                let cache = self.config.cache_path.as_ref().ok_or_else(|| {
                    SttError::Configuration("cache path must be set".to_string())
                })?;
                let model_path = assets::ensure_model(cache, &self.config.model).await?;

                info!(model = %model_path.display(), "loading whisper model");
                let path = model_path.to_string_lossy().to_string();
                let context = tokio::task::spawn_blocking(move || {
                    WhisperContext::new_with_params(&path, WhisperContextParameters::default())
                })
                .await
                .map_err(|e| SttError::Backend(format!("model load task: {e}")))?
                .map_err(|e| SttError::Backend(format!("model load: {e}")))?;

                Ok(Arc::new(Engine { context }))
            })
            .await
            .cloned()
    }

    /// Transport samples -> 16 kHz mono f32.
    fn prepare_samples(clip: &AudioClip) -> Vec<f32> {
        let mono = resample::downmix_to_mono(&clip.samples, clip.channels);
        let normalized = resample::pcm16_to_f32(&mono);
        resample::resample_f32(&normalized, clip.sample_rate, WHISPER_SAMPLE_RATE)
    }
}

#[async_trait]
impl Transcriber for WhisperStt {
    async fn prepare(&self) -> Result<(), SttError> {
        self.engine().await.map(|_| ())
    }

    async fn transcribe(&self, clip: &AudioClip) -> Result<String, SttError> {
        if clip.is_empty() {
            return Ok(String::new());
        }

        let engine = self.engine().await?;
        let samples = Self::prepare_samples(clip);
        let language = self.config.language.clone();

        debug!(samples = samples.len(), "running local whisper inference");
        let text = tokio::task::spawn_blocking(move || -> Result<String, SttError> {
            let mut state = engine
                .context
                .create_state()
                .map_err(|e| SttError::Backend(format!("inference state: {e}")))?;

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_print_special(false);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);
            params.set_language(Some(language.as_str()));

            state
                .full(params, &samples)
                .map_err(|e| SttError::Backend(format!("inference: {e}")))?;

            let segments = state
                .full_n_segments()
                .map_err(|e| SttError::Backend(format!("segment count: {e}")))?;
            let mut text = String::new();
            for i in 0..segments {
                let segment = state
                    .full_get_segment_text(i)
                    .map_err(|e| SttError::Backend(format!("segment text: {e}")))?;
                text.push_str(segment.trim());
                text.push(' ');
            }
            Ok(text.trim().to_string())
        })
        .await
        .map_err(|e| SttError::Backend(format!("inference task: {e}")))??;

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}
