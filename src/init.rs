//! Initialization helpers for preparing runtime assets before serving
//! sessions.
//!
//! This module powers the `murmur init` CLI command. With the `whisper`
//! feature enabled it downloads and caches the ggml model the local
//! transcription backend needs:
//!
//! ```text
//! $ CACHE_PATH=~/.cache/murmur murmur init
//! ```

use anyhow::Result;

#[cfg(feature = "whisper")]
use anyhow::Context;

#[cfg(feature = "whisper")]
use crate::config::AppConfig;

/// Download and prepare all assets required for runtime execution.
#[cfg(feature = "whisper")]
pub async fn run() -> Result<()> {
    use crate::core::stt::assets;

    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let cache_path = config
        .cache_path
        .context("CACHE_PATH environment variable must be set to run `murmur init`")?;

    tracing::info!("Initializing murmur...");
    tracing::info!("Cache path: {:?}", cache_path);

    match assets::ensure_model(&cache_path, &config.whisper_model).await {
        Ok(path) => {
            tracing::info!("Whisper model ready at {:?}", path);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Failed to provision whisper model: {e}");
            tracing::error!(
                "You can manually download ggml models from: https://huggingface.co/ggerganov/whisper.cpp"
            );
            Err(anyhow::anyhow!(e.to_string()))
        }
    }
}

/// Without the `whisper` feature there is nothing to provision.
#[cfg(not(feature = "whisper"))]
pub async fn run() -> Result<()> {
    tracing::info!(
        "No assets to provision: the remote transcription backend needs no local model. \
         Rebuild with --features whisper for local inference."
    );
    Ok(())
}
