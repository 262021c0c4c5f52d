//! Persisted per-user feature opt-outs.
//!
//! Two user-id lists — TTS-ignore and transcription-ignore — backed by a
//! JSON file. Loaded once at startup, consulted on every frame and
//! message, and rewritten synchronously after each mutation so a restart
//! never loses an opt-out.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::transport::SpeakerId;
use crate::errors::{EngineError, EngineResult};

/// The on-disk shape of the ignore lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VoiceSettings {
    #[serde(default)]
    pub tts_ignore: Vec<u64>,
    #[serde(default)]
    pub transcriber_ignore: Vec<u64>,
}

/// Shared, persisted settings. Reads are lock-cheap (per-frame lookups);
/// writes rewrite the backing file before returning.
pub struct SettingsStore {
    path: PathBuf,
    inner: RwLock<VoiceSettings>,
}

impl SettingsStore {
    /// Load from `path`, falling back to defaults when the file does not
    /// exist yet.
    pub fn load(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let settings = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)
                .map_err(|e| EngineError::Configuration(format!("settings file {path:?}: {e}")))?
        } else {
            VoiceSettings::default()
        };
        Ok(Self {
            path,
            inner: RwLock::new(settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> VoiceSettings {
        self.inner.read().clone()
    }

    pub fn is_tts_ignored(&self, speaker: SpeakerId) -> bool {
        self.inner.read().tts_ignore.contains(&speaker.0)
    }

    pub fn is_transcriber_ignored(&self, speaker: SpeakerId) -> bool {
        self.inner.read().transcriber_ignore.contains(&speaker.0)
    }

    /// Add to the TTS-ignore list. Returns false when already present.
    pub fn ignore_tts(&self, speaker: SpeakerId) -> EngineResult<bool> {
        self.mutate(|s| insert(&mut s.tts_ignore, speaker.0))
    }

    pub fn unignore_tts(&self, speaker: SpeakerId) -> EngineResult<bool> {
        self.mutate(|s| remove(&mut s.tts_ignore, speaker.0))
    }

    /// Add to the transcription-ignore list. Returns false when already
    /// present.
    pub fn ignore_transcriber(&self, speaker: SpeakerId) -> EngineResult<bool> {
        self.mutate(|s| insert(&mut s.transcriber_ignore, speaker.0))
    }

    pub fn unignore_transcriber(&self, speaker: SpeakerId) -> EngineResult<bool> {
        self.mutate(|s| remove(&mut s.transcriber_ignore, speaker.0))
    }

    fn mutate(&self, apply: impl FnOnce(&mut VoiceSettings) -> bool) -> EngineResult<bool> {
        let mut inner = self.inner.write();
        if !apply(&mut inner) {
            return Ok(false);
        }
        self.persist(&inner)?;
        Ok(true)
    }

    fn persist(&self, settings: &VoiceSettings) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(settings)
            .map_err(|e| EngineError::Configuration(format!("serialize settings: {e}")))?;
        std::fs::write(&self.path, raw)?;
        info!(path = %self.path.display(), "voice settings saved");
        Ok(())
    }
}

fn insert(list: &mut Vec<u64>, id: u64) -> bool {
    if list.contains(&id) {
        return false;
    }
    list.push(id);
    true
}

fn remove(list: &mut Vec<u64>, id: u64) -> bool {
    let before = list.len();
    list.retain(|&existing| existing != id);
    list.len() != before
}
