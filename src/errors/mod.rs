//! Crate-level error types.
//!
//! Backend-specific errors (`SttError`, `TtsError`) live next to their
//! traits in `core::stt` and `core::tts`; this module holds the errors that
//! cross component boundaries: the session registry contract and the
//! umbrella type surfaced at the binary boundary.

pub mod session_error;

pub use session_error::{EngineError, EngineResult, SessionError};
