use crate::core::codec::CodecError;
use crate::core::stt::SttError;
use crate::core::tts::TtsError;
use crate::core::transport::TransportError;

/// Errors produced by the session registry contract.
///
/// These are the only errors a caller of `join`/`leave` sees; everything
/// that happens inside a running session (backend failures, codec errors)
/// is isolated to the affected utterance or message and logged instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// `join` was called for a call that already has a live session.
    #[error("a voice session is already active for call {0}")]
    AlreadyActive(u64),

    /// `leave` (or a per-session command) was called for a call with no
    /// live session.
    #[error("no active voice session for call {0}")]
    NotActive(u64),

    /// A per-session feature command was invalid in the current state,
    /// e.g. enabling TTS twice.
    #[error("{0}")]
    InvalidState(String),
}

/// Umbrella error for startup and provisioning paths.
///
/// Steady-state operation never returns this; per-item failures are
/// logged and dropped per the propagation policy.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Stt(#[from] SttError),

    #[error(transparent)]
    Tts(#[from] TtsError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
