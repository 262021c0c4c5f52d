//! Model provisioning for the local transcription backend.
//!
//! ggml models are fetched from the whisper.cpp repository on HuggingFace
//! and cached under `<cache>/whisper/<model>.bin`. Provisioning is
//! download-if-absent and guarded by a process-wide lock so concurrent
//! sessions trigger at most one download.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::base::SttError;

/// HuggingFace repository serving ggml whisper models.
const GGML_REPO_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Models known to work with this backend.
pub const SUPPORTED_MODELS: &[&str] = &[
    "ggml-tiny.en",
    "ggml-base.en",
    "ggml-small.en",
    "ggml-base",
    "ggml-small",
];

static PROVISION_LOCK: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// Path the model file lives at once provisioned.
pub fn model_path(cache_path: &Path, model: &str) -> PathBuf {
    cache_path.join("whisper").join(format!("{model}.bin"))
}

/// Download the model if it is not already cached, returning its path.
///
/// Serialized process-wide: a second caller waits for the first download
/// rather than starting its own.
pub async fn ensure_model(cache_path: &Path, model: &str) -> Result<PathBuf, SttError> {
    if !SUPPORTED_MODELS.contains(&model) {
        return Err(SttError::Configuration(format!(
            "unknown whisper model '{model}'; supported: {}",
            SUPPORTED_MODELS.join(", ")
        )));
    }

    let target = model_path(cache_path, model);

    let _guard = PROVISION_LOCK.lock().await;
    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        return Ok(target);
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SttError::Configuration(format!("create cache dir: {e}")))?;
    }

    let url = format!("{GGML_REPO_URL}/{model}.bin");
    info!(model, url = %url, "downloading whisper model (first use)");

    let mut response = reqwest::get(&url)
        .await
        .map_err(|e| SttError::Network(format!("model download: {e}")))?
        .error_for_status()
        .map_err(|e| SttError::Backend(format!("model download: {e}")))?;

    // Stream into a .part file, then rename, so an interrupted download
    // never masquerades as a complete model.
    let partial = target.with_extension("bin.part");
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| SttError::Configuration(format!("create model file: {e}")))?;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| SttError::Network(format!("model download: {e}")))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| SttError::Configuration(format!("write model file: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| SttError::Configuration(format!("flush model file: {e}")))?;
    drop(file);

    tokio::fs::rename(&partial, &target)
        .await
        .map_err(|e| SttError::Configuration(format!("finalize model file: {e}")))?;

    info!(model, path = %target.display(), "whisper model ready");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_is_under_cache() {
        let path = model_path(Path::new("/tmp/cache"), "ggml-base.en");
        assert_eq!(
            path,
            PathBuf::from("/tmp/cache/whisper/ggml-base.en.bin")
        );
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_before_any_io() {
        let err = ensure_model(Path::new("/nonexistent"), "ggml-made-up")
            .await
            .unwrap_err();
        assert!(matches!(err, SttError::Configuration(_)));
    }
}
