use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::endpoint::EndpointConfig;
use crate::core::session::SessionConfig;
use crate::core::stt::{SttBackendKind, SttConfig};
use crate::core::tts::TtsConfig;
use crate::errors::{EngineError, EngineResult};

/// Default location of the interactive credential file.
pub const CREDENTIALS_PATH: &str = "config.json";

/// Application configuration, constructed once at startup and passed into
/// the registry by value. No ambient lookups after this point.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub assemblyai_api_key: Option<String>,

    /// Language for transcription (remote backend code, e.g. "en_us").
    pub stt_language: String,
    /// Language for synthesis (e.g. "en").
    pub tts_language: String,

    /// Cache directory for local model artifacts.
    pub cache_path: Option<PathBuf>,
    /// Local whisper model name (ggml convention).
    pub whisper_model: String,

    /// Silence gap that ends an utterance, milliseconds.
    pub silence_threshold_ms: u64,

    /// Backend variant new sessions start on.
    pub default_backend: SttBackendKind,

    /// Where the persisted ignore lists live.
    pub settings_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            assemblyai_api_key: None,
            stt_language: "en_us".to_string(),
            tts_language: "en".to_string(),
            cache_path: None,
            whisper_model: "ggml-base.en".to_string(),
            silence_threshold_ms: 500,
            default_backend: SttBackendKind::Remote,
            settings_path: PathBuf::from("voice_settings.json"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let assemblyai_api_key = env::var("ASSEMBLYAI_API_KEY").ok().filter(|k| !k.is_empty());
        let stt_language = env::var("STT_LANGUAGE").unwrap_or_else(|_| "en_us".to_string());
        let tts_language = env::var("TTS_LANGUAGE").unwrap_or_else(|_| "en".to_string());
        let cache_path = env::var("CACHE_PATH").ok().map(PathBuf::from);
        let whisper_model =
            env::var("WHISPER_MODEL").unwrap_or_else(|_| "ggml-base.en".to_string());

        let silence_threshold_ms = match env::var("SILENCE_THRESHOLD_MS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                EngineError::Configuration(format!("invalid SILENCE_THRESHOLD_MS: {e}"))
            })?,
            Err(_) => 500,
        };

        let default_backend = match env::var("STT_BACKEND").as_deref() {
            Ok("local") => SttBackendKind::Local,
            Ok("remote") | Err(_) => SttBackendKind::Remote,
            Ok(other) => {
                return Err(EngineError::Configuration(format!(
                    "invalid STT_BACKEND '{other}', expected 'remote' or 'local'"
                )));
            }
        };

        let settings_path = env::var("VOICE_SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("voice_settings.json"));

        Ok(Self {
            assemblyai_api_key,
            stt_language,
            tts_language,
            cache_path,
            whisper_model,
            silence_threshold_ms,
            default_backend,
            settings_path,
        })
    }

    /// Derive the per-session configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            endpoint: EndpointConfig {
                silence_threshold: Duration::from_millis(self.silence_threshold_ms),
                ..EndpointConfig::default()
            },
            stt: SttConfig {
                api_key: self.assemblyai_api_key.clone(),
                language: self.stt_language.clone(),
                cache_path: self.cache_path.clone(),
                model: self.whisper_model.clone(),
                ..SttConfig::default()
            },
            tts: TtsConfig {
                language: self.tts_language.clone(),
                ..TtsConfig::default()
            },
            default_backend: self.default_backend,
        }
    }
}

/// On-disk credential record, created interactively on first run.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCredentials {
    assemblyai_api_key: String,
}

/// Load the API key from `path`, prompting on stdin and writing the file
/// when it is missing or unreadable.
pub fn load_or_prompt_credentials(path: &Path) -> EngineResult<String> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        match serde_json::from_str::<StoredCredentials>(&raw) {
            Ok(stored) if !stored.assemblyai_api_key.trim().is_empty() => {
                return Ok(stored.assemblyai_api_key);
            }
            Ok(_) => eprintln!("Credential file {path:?} has an empty key; re-entering."),
            Err(e) => eprintln!("Credential file {path:?} is unreadable ({e}); re-entering."),
        }
    }

    let key = prompt("Enter your AssemblyAI API key: ")?;
    if key.is_empty() {
        return Err(EngineError::Configuration(
            "an AssemblyAI API key is required".to_string(),
        ));
    }

    let stored = StoredCredentials {
        assemblyai_api_key: key.clone(),
    };
    let raw = serde_json::to_string_pretty(&stored)
        .map_err(|e| EngineError::Configuration(format!("serialize credentials: {e}")))?;
    std::fs::write(path, raw)?;
    eprintln!("Saved to {path:?}. Edit or delete the file to change it later.");
    Ok(key)
}

fn prompt(message: &str) -> EngineResult<String> {
    eprint!("{message}");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_engine_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.silence_threshold_ms, 500);
        assert_eq!(config.default_backend, SttBackendKind::Remote);
        assert_eq!(config.whisper_model, "ggml-base.en");
    }

    #[test]
    fn session_config_carries_overrides() {
        let config = AppConfig {
            assemblyai_api_key: Some("key".into()),
            silence_threshold_ms: 750,
            ..Default::default()
        };
        let session = config.session_config();
        assert_eq!(
            session.endpoint.silence_threshold,
            Duration::from_millis(750)
        );
        assert_eq!(session.stt.api_key.as_deref(), Some("key"));
        assert_eq!(session.tts.language, "en");
    }

    #[test]
    fn stored_credentials_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "assemblyai_api_key": "abc123" }"#,
        )
        .unwrap();
        assert_eq!(load_or_prompt_credentials(&path).unwrap(), "abc123");
    }
}
