//! Session lifecycle and the per-session background machinery.

pub mod dispatcher;
pub mod playback;
pub mod registry;
pub mod session;
pub mod tts_queue;

pub use dispatcher::{MAX_CONCURRENT_TRANSCRIPTIONS, TranscriptionDispatcher};
pub use playback::{OpusPlayback, Playback};
pub use registry::SessionRegistry;
pub use session::{SessionConfig, VoiceSession};
pub use tts_queue::{MAX_CONCURRENT_SYNTHESIS, TtsQueue};
