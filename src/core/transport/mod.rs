//! Interface boundary to the voice transport and text channel.
//!
//! The engine never talks to a concrete gateway protocol; it consumes
//! speaker-tagged compressed frames and inbound text messages through the
//! traits here, and emits one continuous outbound audio stream plus text
//! posts. Observer registration is explicit: subscribing returns a
//! [`Subscription`] the session owns and releases during teardown, so no
//! callback can fire against a destroyed session.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

pub use memory::{MemoryChannel, MemoryGateway, MemorySink};

/// Identity of one voice call (community/channel scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

/// Identity of one speaker/user within a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpeakerId(pub u64);

/// Identity of a text channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One fixed-duration compressed audio frame from the transport.
#[derive(Debug, Clone)]
pub struct VoiceFrame {
    pub speaker: SpeakerId,
    /// Opus packet payload.
    pub payload: Bytes,
    /// Transport timestamp, milliseconds.
    pub timestamp_ms: u64,
}

/// One inbound text message from the bound channel's surface.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub author: SpeakerId,
    pub channel: ChannelId,
    pub content: String,
    /// True when the author is an automated account (skipped for TTS).
    pub from_bot: bool,
}

/// Errors crossing the transport boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport i/o failed: {0}")]
    Io(String),

    #[error("transport protocol error: {0}")]
    Protocol(String),
}

/// Callback invoked for every inbound frame. Must not block: the ingest
/// path does decode + append + deadline rearm only.
pub type FrameHandler = Arc<dyn Fn(VoiceFrame) + Send + Sync>;

/// Callback invoked for every inbound text message.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// A cancellable observer registration.
///
/// Cancelling (or dropping) detaches the handler from the event source.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detach the handler. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

/// The single continuous outbound audio stream of a session.
#[async_trait]
pub trait AudioSink: Send {
    /// Write one encoded packet. Callers guarantee sequential access.
    async fn write(&mut self, packet: Bytes) -> Result<(), TransportError>;

    async fn flush(&mut self) -> Result<(), TransportError>;
}

/// The voice transport collaborator: frame delivery, outbound stream,
/// speaking-state signaling.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    fn subscribe_frames(&self, handler: FrameHandler) -> Subscription;

    /// Open the session's outbound stream. At most one sink is active per
    /// session; the TTS consumer is its only writer.
    fn open_sink(&self) -> Result<Box<dyn AudioSink>, TransportError>;

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError>;

    /// Resolve a speaker's display name, if the transport knows it.
    async fn display_name(&self, speaker: SpeakerId) -> Option<String>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// The text-channel collaborator: inbound messages and outbound posts.
#[async_trait]
pub trait TextChannel: Send + Sync {
    fn id(&self) -> ChannelId;

    fn subscribe_messages(&self, handler: MessageHandler) -> Subscription;

    async fn post(&self, content: &str) -> Result<(), TransportError>;
}
