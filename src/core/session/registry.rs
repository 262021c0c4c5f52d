//! Call-to-session registry: at most one live session per call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use super::session::{SessionConfig, VoiceSession};
use crate::core::transport::{CallId, TextChannel, VoiceGateway};
use crate::errors::{EngineResult, SessionError};
use crate::settings::SettingsStore;

/// Maps call identity to its live [`VoiceSession`].
///
/// `join` is rejected while a session exists for the call; `leave` removes
/// the entry before awaiting teardown, so a re-`join` for the same call is
/// valid immediately and no new work can be dispatched to a session
/// mid-teardown.
pub struct SessionRegistry {
    session_config: SessionConfig,
    settings: Arc<SettingsStore>,
    sessions: Mutex<HashMap<u64, Arc<VoiceSession>>>,
}

impl SessionRegistry {
    pub fn new(session_config: SessionConfig, settings: Arc<SettingsStore>) -> Self {
        Self {
            session_config,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register the session for `call`.
    pub fn join(
        &self,
        call: CallId,
        gateway: Arc<dyn VoiceGateway>,
        channel: Arc<dyn TextChannel>,
    ) -> EngineResult<Arc<VoiceSession>> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&call.0) {
            return Err(SessionError::AlreadyActive(call.0).into());
        }

        let session = VoiceSession::new(
            call,
            gateway,
            channel,
            Arc::clone(&self.settings),
            self.session_config.clone(),
        )?;
        sessions.insert(call.0, Arc::clone(&session));
        info!(%call, "voice session joined");
        Ok(session)
    }

    pub fn get(&self, call: CallId) -> Option<Arc<VoiceSession>> {
        self.sessions.lock().get(&call.0).cloned()
    }

    /// Remove the session for `call` and tear it down.
    ///
    /// The map entry is gone before any teardown await; in-flight backend
    /// work owned by the session finishes against its closed gate.
    pub async fn leave(&self, call: CallId) -> EngineResult<Arc<VoiceSession>> {
        let session = self
            .sessions
            .lock()
            .remove(&call.0)
            .ok_or(SessionError::NotActive(call.0))?;
        session.shutdown().await;
        info!(%call, "voice session left");
        Ok(session)
    }

    pub fn active_calls(&self) -> Vec<CallId> {
        self.sessions.lock().keys().map(|&id| CallId(id)).collect()
    }

    /// Remove and tear down every live session (process shutdown).
    pub async fn shutdown_all(&self) {
        let sessions: Vec<Arc<VoiceSession>> =
            self.sessions.lock().drain().map(|(_, session)| session).collect();
        futures::future::join_all(sessions.iter().map(|session| session.shutdown())).await;
        if !sessions.is_empty() {
            info!(count = sessions.len(), "all voice sessions torn down");
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }
}
