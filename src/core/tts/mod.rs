//! Text-to-speech backends.

pub mod base;
pub mod translate;

use std::sync::Arc;

pub use base::{Synthesizer, TtsConfig, TtsError};
pub use translate::TranslateTts;

/// Build the synthesis backend for a session.
pub fn create_synthesizer(config: &TtsConfig) -> Result<Arc<dyn Synthesizer>, TtsError> {
    Ok(Arc::new(TranslateTts::new(config)?))
}
