//! In-memory transport implementations.
//!
//! A loopback gateway and channel pair for exercising the engine without a
//! real gateway connection: frames and messages are injected directly,
//! outbound packets and posts are recorded for inspection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{
    AudioSink, ChannelId, FrameHandler, InboundMessage, MessageHandler, SpeakerId, Subscription,
    TextChannel, TransportError, VoiceFrame, VoiceGateway,
};

/// Loopback voice gateway. Frames injected with [`MemoryGateway::emit_frame`]
/// are fanned out to live subscribers; outbound packets accumulate in a
/// shared buffer.
#[derive(Default)]
pub struct MemoryGateway {
    next_token: AtomicU64,
    frame_handlers: Arc<Mutex<HashMap<u64, FrameHandler>>>,
    outbound: Arc<Mutex<Vec<Bytes>>>,
    speaking: AtomicBool,
    closed: AtomicBool,
    display_names: Mutex<HashMap<SpeakerId, String>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display name for [`VoiceGateway::display_name`] lookups.
    pub fn set_display_name(&self, speaker: SpeakerId, name: impl Into<String>) {
        self.display_names.lock().insert(speaker, name.into());
    }

    /// Deliver one inbound frame to every live subscriber.
    pub fn emit_frame(&self, frame: VoiceFrame) {
        let handlers: Vec<FrameHandler> = self.frame_handlers.lock().values().cloned().collect();
        for handler in handlers {
            handler(frame.clone());
        }
    }

    /// Packets written to the outbound stream so far, in write order.
    pub fn outbound_packets(&self) -> Vec<Bytes> {
        self.outbound.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.frame_handlers.lock().len()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl VoiceGateway for MemoryGateway {
    fn subscribe_frames(&self, handler: FrameHandler) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.frame_handlers.lock().insert(token, handler);
        let handlers = Arc::clone(&self.frame_handlers);
        Subscription::new(move || {
            handlers.lock().remove(&token);
        })
    }

    fn open_sink(&self) -> Result<Box<dyn AudioSink>, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(Box::new(MemorySink {
            buffer: Arc::clone(&self.outbound),
        }))
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        self.speaking.store(speaking, Ordering::Release);
        Ok(())
    }

    async fn display_name(&self, speaker: SpeakerId) -> Option<String> {
        self.display_names.lock().get(&speaker).cloned()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Sink recording every packet written to it.
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<Bytes>>>,
}

#[async_trait]
impl AudioSink for MemorySink {
    async fn write(&mut self, packet: Bytes) -> Result<(), TransportError> {
        self.buffer.lock().push(packet);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Loopback text channel recording outbound posts.
pub struct MemoryChannel {
    id: ChannelId,
    next_token: AtomicU64,
    message_handlers: Arc<Mutex<HashMap<u64, MessageHandler>>>,
    posts: Mutex<Vec<String>>,
}

impl MemoryChannel {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            next_token: AtomicU64::new(0),
            message_handlers: Arc::new(Mutex::new(HashMap::new())),
            posts: Mutex::new(Vec::new()),
        }
    }

    /// Deliver one inbound message to every live subscriber.
    pub fn emit_message(&self, message: InboundMessage) {
        let handlers: Vec<MessageHandler> =
            self.message_handlers.lock().values().cloned().collect();
        for handler in handlers {
            handler(message.clone());
        }
    }

    /// Text posted to the channel so far, in post order.
    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.message_handlers.lock().len()
    }
}

#[async_trait]
impl TextChannel for MemoryChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn subscribe_messages(&self, handler: MessageHandler) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.message_handlers.lock().insert(token, handler);
        let handlers = Arc::clone(&self.message_handlers);
        Subscription::new(move || {
            handlers.lock().remove(&token);
        })
    }

    async fn post(&self, content: &str) -> Result<(), TransportError> {
        self.posts.lock().push(content.to_string());
        Ok(())
    }
}
