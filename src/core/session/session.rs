//! One live voice session: the full set of state for one active call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatcher::TranscriptionDispatcher;
use super::playback::OpusPlayback;
use super::tts_queue::TtsQueue;
use crate::core::codec::FrameDecoder;
use crate::core::endpoint::{EndpointConfig, SpeakerBuffer, Utterance};
use crate::core::stt::{SttBackendKind, SttConfig, create_transcriber};
use crate::core::tts::{TtsConfig, create_synthesizer};
use crate::core::transport::{
    CallId, InboundMessage, SpeakerId, Subscription, TextChannel, VoiceFrame, VoiceGateway,
};
use crate::errors::{EngineResult, SessionError};
use crate::settings::SettingsStore;

/// Per-session knobs, derived from the application configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: EndpointConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    /// Backend variant sessions start on.
    pub default_backend: SttBackendKind,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
            default_backend: SttBackendKind::Remote,
        }
    }
}

/// Per-speaker ingest state: a stateful Opus decoder plus the endpointing
/// buffer. Created lazily on a speaker's first frame.
struct IngestLane {
    decoder: Mutex<FrameDecoder>,
    buffer: SpeakerBuffer,
}

/// All live state for one active voice call.
///
/// Created by [`super::SessionRegistry::join`], destroyed by `leave`.
/// Feature toggles are independent: transcription listens to voice frames,
/// TTS listens to text messages; either can be enabled without the other.
pub struct VoiceSession {
    call: CallId,
    gateway: Arc<dyn VoiceGateway>,
    channel: Arc<dyn TextChannel>,
    settings: Arc<SettingsStore>,
    config: SessionConfig,

    transcriber: Arc<RwLock<Arc<dyn crate::core::stt::Transcriber>>>,
    backend_kind: Mutex<SttBackendKind>,
    dispatcher: TranscriptionDispatcher,
    tts_queue: TtsQueue,

    lanes: Mutex<HashMap<SpeakerId, Arc<IngestLane>>>,
    flush_tx: UnboundedSender<Utterance>,
    flush_task: Mutex<Option<JoinHandle<()>>>,

    frame_sub: Mutex<Option<Subscription>>,
    message_sub: Mutex<Option<Subscription>>,

    transcription_enabled: AtomicBool,
    tts_enabled: AtomicBool,
    closed: Arc<AtomicBool>,

    /// Self-reference for handing weak handles to transport callbacks, so
    /// a lingering subscription can never keep a session alive.
    weak_self: Weak<VoiceSession>,
}

impl std::fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSession")
            .field("call", &self.call)
            .finish_non_exhaustive()
    }
}

impl VoiceSession {
    /// Build a session with backends created from `config` via the
    /// factories.
    pub fn new(
        call: CallId,
        gateway: Arc<dyn VoiceGateway>,
        channel: Arc<dyn TextChannel>,
        settings: Arc<SettingsStore>,
        config: SessionConfig,
    ) -> EngineResult<Arc<Self>> {
        let transcriber = create_transcriber(config.default_backend, &config.stt)?;
        let synthesizer = create_synthesizer(&config.tts)?;
        Ok(Self::with_backends(
            call,
            gateway,
            channel,
            settings,
            config,
            transcriber,
            synthesizer,
        ))
    }

    /// Build a session around explicit backend instances. Embedders (and
    /// tests) use this to plug in custom transcription or synthesis.
    pub fn with_backends(
        call: CallId,
        gateway: Arc<dyn VoiceGateway>,
        channel: Arc<dyn TextChannel>,
        settings: Arc<SettingsStore>,
        config: SessionConfig,
        transcriber: Arc<dyn crate::core::stt::Transcriber>,
        synthesizer: Arc<dyn crate::core::tts::Synthesizer>,
    ) -> Arc<Self> {
        let transcriber = Arc::new(RwLock::new(transcriber));

        let closed = Arc::new(AtomicBool::new(false));
        let dispatcher = TranscriptionDispatcher::new(
            Arc::clone(&transcriber),
            Arc::clone(&gateway),
            Arc::clone(&channel),
            Arc::clone(&closed),
        );
        let tts_queue = TtsQueue::new(synthesizer);

        let (flush_tx, mut flush_rx) = mpsc::unbounded_channel::<Utterance>();

        let session = Arc::new_cyclic(|weak_self: &Weak<VoiceSession>| Self {
            call,
            gateway,
            channel,
            settings,
            backend_kind: Mutex::new(config.default_backend),
            config,
            transcriber,
            dispatcher,
            tts_queue,
            lanes: Mutex::new(HashMap::new()),
            flush_tx,
            flush_task: Mutex::new(None),
            frame_sub: Mutex::new(None),
            message_sub: Mutex::new(None),
            transcription_enabled: AtomicBool::new(false),
            tts_enabled: AtomicBool::new(false),
            closed,
            weak_self: weak_self.clone(),
        });

        // Route flushed utterances into the dispatcher off the timer tasks.
        let dispatcher = session.dispatcher.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(utterance) = flush_rx.recv().await {
                dispatcher.submit(utterance);
            }
        });
        *session.flush_task.lock() = Some(forwarder);

        session
    }

    pub fn call_id(&self) -> CallId {
        self.call
    }

    pub fn is_transcription_enabled(&self) -> bool {
        self.transcription_enabled.load(Ordering::Acquire)
    }

    pub fn is_tts_enabled(&self) -> bool {
        self.tts_enabled.load(Ordering::Acquire)
    }

    pub fn backend_kind(&self) -> SttBackendKind {
        *self.backend_kind.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Start transcribing: subscribe to voice frames and begin endpointing.
    pub fn enable_transcription(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.transcription_enabled.swap(true, Ordering::AcqRel) {
            return Err(SessionError::InvalidState(
                "transcription is already enabled".to_string(),
            ));
        }

        let weak = self.weak_self.clone();
        let subscription = self.gateway.subscribe_frames(Arc::new(move |frame| {
            if let Some(session) = weak.upgrade() {
                session.on_frame(frame);
            }
        }));
        *self.frame_sub.lock() = Some(subscription);

        info!(call = %self.call, "transcription enabled");
        Ok(())
    }

    /// Stop accepting new frames. Buffers already accumulating flush on
    /// their pending deadlines and drain through the dispatcher.
    pub fn disable_transcription(&self) -> Result<(), SessionError> {
        if !self.transcription_enabled.swap(false, Ordering::AcqRel) {
            return Err(SessionError::InvalidState(
                "transcription is not enabled".to_string(),
            ));
        }
        if let Some(mut subscription) = self.frame_sub.lock().take() {
            subscription.cancel();
        }
        info!(call = %self.call, "transcription disabled");
        Ok(())
    }

    /// Start speaking: open the outbound stream, start the playback
    /// consumer, and subscribe to the bound channel's messages.
    pub async fn enable_tts(&self) -> EngineResult<()> {
        self.ensure_open()?;
        if self.tts_enabled.swap(true, Ordering::AcqRel) {
            return Err(SessionError::InvalidState("tts is already enabled".to_string()).into());
        }

        let playback: Result<OpusPlayback, crate::errors::EngineError> = self
            .gateway
            .open_sink()
            .map_err(Into::into)
            .and_then(|sink| OpusPlayback::new(sink).map_err(Into::into));
        let playback = match playback {
            Ok(playback) => playback,
            Err(e) => {
                self.tts_enabled.store(false, Ordering::Release);
                return Err(e);
            }
        };
        self.tts_queue.enable(Box::new(playback));

        let weak = self.weak_self.clone();
        let subscription = self.channel.subscribe_messages(Arc::new(move |message| {
            if let Some(session) = weak.upgrade() {
                session.on_message(message);
            }
        }));
        *self.message_sub.lock() = Some(subscription);

        if let Err(e) = self.gateway.set_speaking(true).await {
            warn!(call = %self.call, error = %e, "failed to signal speaking state");
        }

        info!(call = %self.call, "tts enabled");
        Ok(())
    }

    /// Stop speaking: no further messages are accepted, the item currently
    /// playing finishes before this returns.
    pub async fn disable_tts(&self) -> Result<(), SessionError> {
        if !self.tts_enabled.swap(false, Ordering::AcqRel) {
            return Err(SessionError::InvalidState("tts is not enabled".to_string()));
        }
        if let Some(mut subscription) = self.message_sub.lock().take() {
            subscription.cancel();
        }
        self.tts_queue.disable().await;
        if let Err(e) = self.gateway.set_speaking(false).await {
            debug!(call = %self.call, error = %e, "failed to clear speaking state");
        }
        info!(call = %self.call, "tts disabled");
        Ok(())
    }

    /// Switch the transcription backend variant. In-flight jobs keep the
    /// backend they started with; new utterances use the new one.
    pub fn set_backend(&self, kind: SttBackendKind) -> EngineResult<()> {
        self.ensure_open()?;
        let mut current = self.backend_kind.lock();
        if *current == kind {
            return Err(SessionError::InvalidState(format!(
                "{kind} transcription backend is already selected"
            ))
            .into());
        }
        let backend = create_transcriber(kind, &self.config.stt)?;
        *self.transcriber.write() = backend;
        *current = kind;
        info!(call = %self.call, backend = %kind, "transcription backend switched");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::NotActive(self.call.0));
        }
        Ok(())
    }

    /// Ingest path: decode + append + deadline rearm. Called for every
    /// frame the transport delivers; must stay free of I/O and awaits.
    fn on_frame(&self, frame: VoiceFrame) {
        if self.closed.load(Ordering::Acquire) || !self.transcription_enabled.load(Ordering::Acquire)
        {
            return;
        }
        // Ignored speakers are dropped before any buffer state exists.
        if self.settings.is_transcriber_ignored(frame.speaker) {
            return;
        }

        let lane = {
            let mut lanes = self.lanes.lock();
            match lanes.get(&frame.speaker) {
                Some(lane) => Arc::clone(lane),
                None => {
                    let decoder = match FrameDecoder::new() {
                        Ok(decoder) => decoder,
                        Err(e) => {
                            warn!(speaker = %frame.speaker, error = %e, "decoder init failed");
                            return;
                        }
                    };
                    let lane = Arc::new(IngestLane {
                        decoder: Mutex::new(decoder),
                        buffer: SpeakerBuffer::new(
                            frame.speaker,
                            self.config.endpoint,
                            self.flush_tx.clone(),
                        ),
                    });
                    lanes.insert(frame.speaker, Arc::clone(&lane));
                    lane
                }
            }
        };

        let pcm = match lane.decoder.lock().decode(&frame.payload) {
            Ok(pcm) => pcm,
            Err(e) => {
                // A bad frame is skipped; the buffer keeps going.
                warn!(speaker = %frame.speaker, error = %e, "frame decode failed, skipped");
                return;
            }
        };
        lane.buffer.push_frame(&pcm);
    }

    /// Message path: filter and enqueue for synthesis.
    fn on_message(&self, message: InboundMessage) {
        if self.closed.load(Ordering::Acquire) || !self.tts_enabled.load(Ordering::Acquire) {
            return;
        }
        if message.from_bot || message.channel != self.channel.id() {
            return;
        }
        if self.settings.is_tts_ignored(message.author) {
            return;
        }
        if message.content.trim().is_empty() {
            return;
        }
        self.tts_queue.enqueue(message.content);
    }

    /// Tear the session down: detach every listener, cancel pending
    /// deadlines, drain the playback consumer, close the gateway.
    ///
    /// The registry removes the session from its map before calling this,
    /// so no new work can reach the session while it runs. Idempotent.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Detach from event sources first: past this point no callback can
        // fire against the session.
        if let Some(mut subscription) = self.frame_sub.lock().take() {
            subscription.cancel();
        }
        if let Some(mut subscription) = self.message_sub.lock().take() {
            subscription.cancel();
        }
        self.transcription_enabled.store(false, Ordering::Release);
        self.tts_enabled.store(false, Ordering::Release);

        // Cancel every pending silence deadline before releasing buffers.
        for lane in self.lanes.lock().values() {
            lane.buffer.cancel();
        }
        if let Some(forwarder) = self.flush_task.lock().take() {
            forwarder.abort();
        }

        // Let the item currently playing finish; drop the rest.
        self.tts_queue.disable().await;

        if let Err(e) = self.gateway.close().await {
            debug!(call = %self.call, error = %e, "gateway close failed");
        }
        info!(call = %self.call, "voice session torn down");
    }
}
