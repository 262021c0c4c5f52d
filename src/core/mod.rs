pub mod codec;
pub mod endpoint;
pub mod session;
pub mod stt;
pub mod transport;
pub mod tts;

// Re-export commonly used types for convenience
pub use codec::{AudioClip, CodecError, FrameDecoder, StreamEncoder};
pub use endpoint::{EndpointConfig, SILENCE_THRESHOLD, SpeakerBuffer, Utterance};
pub use session::{
    MAX_CONCURRENT_SYNTHESIS, MAX_CONCURRENT_TRANSCRIPTIONS, SessionConfig, SessionRegistry,
    TtsQueue, VoiceSession,
};
pub use stt::{SttBackendKind, SttConfig, SttError, Transcriber, create_transcriber};
pub use transport::{
    AudioSink, CallId, ChannelId, InboundMessage, SpeakerId, Subscription, TextChannel,
    TransportError, VoiceFrame, VoiceGateway,
};
pub use tts::{Synthesizer, TtsConfig, TtsError, create_synthesizer};
