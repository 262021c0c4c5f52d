//! Speech-to-text backends.
//!
//! Two variants behind one trait: a remote upload-and-poll API
//! ([`AssemblyAiStt`]) and, behind the `whisper` feature, local
//! whisper.cpp inference ([`WhisperStt`]). Sessions switch between them at
//! runtime via [`create_transcriber`].

pub mod base;

pub mod assemblyai;

#[cfg(feature = "whisper")]
pub mod assets;
#[cfg(feature = "whisper")]
pub mod whisper;

use std::sync::Arc;

pub use assemblyai::AssemblyAiStt;
pub use base::{SttBackendKind, SttConfig, SttError, Transcriber};
#[cfg(feature = "whisper")]
pub use whisper::{WHISPER_SAMPLE_RATE, WhisperStt};

/// Build the transcription backend for a session.
pub fn create_transcriber(
    kind: SttBackendKind,
    config: &SttConfig,
) -> Result<Arc<dyn Transcriber>, SttError> {
    match kind {
        SttBackendKind::Remote => Ok(Arc::new(AssemblyAiStt::new(config)?)),
        #[cfg(feature = "whisper")]
        SttBackendKind::Local => Ok(Arc::new(WhisperStt::new(config)?)),
        #[cfg(not(feature = "whisper"))]
        SttBackendKind::Local => Err(SttError::Configuration(
            "local transcription requires building with the `whisper` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_remote_backend() {
        let config = SttConfig {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        let transcriber = create_transcriber(SttBackendKind::Remote, &config).unwrap();
        assert_eq!(transcriber.name(), "assemblyai");
    }

    #[cfg(not(feature = "whisper"))]
    #[test]
    fn factory_rejects_local_backend_without_feature() {
        let config = SttConfig::default();
        assert!(create_transcriber(SttBackendKind::Local, &config).is_err());
    }
}
