//! Concurrency-bounded transcription dispatch.
//!
//! `submit` never blocks the ingest path: each utterance gets its own
//! worker task, and the worker acquires one of the session's transcription
//! slots before calling the backend. When all slots are busy the worker
//! queues on the semaphore — deliberate backpressure against the backend,
//! not an error. One utterance's failure is logged and dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::core::endpoint::Utterance;
use crate::core::stt::Transcriber;
use crate::core::transport::{TextChannel, VoiceGateway};

/// Simultaneous backend calls allowed per session.
pub const MAX_CONCURRENT_TRANSCRIPTIONS: usize = 5;

/// Shared handle to the session's current transcription backend; swapped
/// when the session switches backend variant.
pub type SharedTranscriber = Arc<RwLock<Arc<dyn Transcriber>>>;

#[derive(Clone)]
pub struct TranscriptionDispatcher {
    slots: Arc<Semaphore>,
    transcriber: SharedTranscriber,
    gateway: Arc<dyn VoiceGateway>,
    channel: Arc<dyn TextChannel>,
    closed: Arc<AtomicBool>,
}

impl TranscriptionDispatcher {
    pub fn new(
        transcriber: SharedTranscriber,
        gateway: Arc<dyn VoiceGateway>,
        channel: Arc<dyn TextChannel>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(MAX_CONCURRENT_TRANSCRIPTIONS)),
            transcriber,
            gateway,
            channel,
            closed,
        }
    }

    /// Dispatch one flushed utterance. Returns immediately; the backend
    /// call happens on a worker holding a concurrency slot.
    pub fn submit(&self, utterance: Utterance) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let slots = Arc::clone(&self.slots);
        let transcriber = Arc::clone(&self.transcriber);
        let gateway = Arc::clone(&self.gateway);
        let channel = Arc::clone(&self.channel);
        let closed = Arc::clone(&self.closed);

        tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };

            let backend = transcriber.read().clone();
            let speaker = utterance.speaker;
            debug!(
                %speaker,
                duration_ms = utterance.audio.duration_ms(),
                backend = backend.name(),
                "transcribing utterance"
            );

            match backend.transcribe(&utterance.audio).await {
                Ok(text) if !text.trim().is_empty() => {
                    // The session may have been torn down while the backend
                    // ran; its output is discarded, never posted.
                    if closed.load(Ordering::Acquire) {
                        debug!(%speaker, "session closed; discarding transcript");
                        return;
                    }
                    let name = gateway
                        .display_name(speaker)
                        .await
                        .unwrap_or_else(|| format!("user-{speaker}"));
                    let message = format!("**{name}:** {}", text.trim());
                    if let Err(e) = channel.post(&message).await {
                        warn!(%speaker, error = %e, "failed to post transcript");
                    }
                }
                Ok(_) => debug!(%speaker, "empty transcript, nothing to post"),
                Err(e) => {
                    warn!(
                        %speaker,
                        backend = backend.name(),
                        error = %e,
                        "transcription failed, utterance dropped"
                    );
                }
            }
        });
    }

    /// Free transcription slots right now (diagnostic accessor).
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::core::codec::AudioClip;
    use crate::core::stt::SttError;
    use crate::core::transport::{ChannelId, MemoryChannel, MemoryGateway, SpeakerId};

    /// Backend that tracks its own peak concurrency.
    struct CountingStt {
        current: AtomicUsize,
        peak: AtomicUsize,
        completed: AtomicUsize,
        hold: Duration,
    }

    impl CountingStt {
        fn new(hold: Duration) -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                hold,
            }
        }
    }

    #[async_trait]
    impl Transcriber for CountingStt {
        async fn transcribe(&self, _clip: &AudioClip) -> Result<String, SttError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok("words".to_string())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn utterance(speaker: u64) -> Utterance {
        Utterance {
            speaker: SpeakerId(speaker),
            audio: AudioClip {
                samples: vec![1i16; 1920],
                sample_rate: 48_000,
                channels: 2,
            },
        }
    }

    fn dispatcher_with(
        backend: Arc<dyn Transcriber>,
    ) -> (TranscriptionDispatcher, Arc<MemoryChannel>, Arc<AtomicBool>) {
        let gateway = Arc::new(MemoryGateway::new());
        let channel = Arc::new(MemoryChannel::new(ChannelId(7)));
        let closed = Arc::new(AtomicBool::new(false));
        let dispatcher = TranscriptionDispatcher::new(
            Arc::new(RwLock::new(backend)),
            gateway,
            Arc::clone(&channel) as Arc<dyn TextChannel>,
            Arc::clone(&closed),
        );
        (dispatcher, channel, closed)
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_slot_count() {
        let backend = Arc::new(CountingStt::new(Duration::from_millis(30)));
        let (dispatcher, _channel, _closed) = dispatcher_with(backend.clone());

        // Six submissions against five slots: the sixth waits for a free
        // slot instead of running seven-wide.
        for i in 0..6 {
            dispatcher.submit(utterance(i));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.completed.load(Ordering::SeqCst), 6);
        assert!(backend.peak.load(Ordering::SeqCst) <= MAX_CONCURRENT_TRANSCRIPTIONS);
        assert_eq!(dispatcher.available_slots(), MAX_CONCURRENT_TRANSCRIPTIONS);
    }

    #[tokio::test]
    async fn posts_transcript_with_display_name() {
        struct FixedStt;
        #[async_trait]
        impl Transcriber for FixedStt {
            async fn transcribe(&self, _clip: &AudioClip) -> Result<String, SttError> {
                Ok("  hello there  ".to_string())
            }
            fn name(&self) -> &'static str {
                "fixed"
            }
        }

        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_display_name(SpeakerId(42), "ada");
        let channel = Arc::new(MemoryChannel::new(ChannelId(7)));
        let closed = Arc::new(AtomicBool::new(false));
        let dispatcher = TranscriptionDispatcher::new(
            Arc::new(RwLock::new(Arc::new(FixedStt) as Arc<dyn Transcriber>)),
            gateway,
            Arc::clone(&channel) as Arc<dyn TextChannel>,
            closed,
        );

        dispatcher.submit(utterance(42));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(channel.posts(), vec!["**ada:** hello there".to_string()]);
    }

    #[tokio::test]
    async fn failure_is_isolated_and_drops_the_utterance() {
        struct FailingStt;
        #[async_trait]
        impl Transcriber for FailingStt {
            async fn transcribe(&self, _clip: &AudioClip) -> Result<String, SttError> {
                Err(SttError::Backend("no luck".into()))
            }
            fn name(&self) -> &'static str {
                "failing"
            }
        }

        let (dispatcher, channel, _closed) =
            dispatcher_with(Arc::new(FailingStt) as Arc<dyn Transcriber>);
        dispatcher.submit(utterance(1));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(channel.posts().is_empty());
        // All slots released despite the failure.
        assert_eq!(dispatcher.available_slots(), MAX_CONCURRENT_TRANSCRIPTIONS);
    }

    #[tokio::test]
    async fn closed_gate_discards_late_transcripts() {
        let backend = Arc::new(CountingStt::new(Duration::from_millis(50)));
        let (dispatcher, channel, closed) = dispatcher_with(backend);

        dispatcher.submit(utterance(1));
        // Close mid-flight: the backend call finishes but nothing posts.
        tokio::time::sleep(Duration::from_millis(10)).await;
        closed.store(true, Ordering::Release);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(channel.posts().is_empty());
    }

    #[tokio::test]
    async fn submit_after_close_is_a_no_op() {
        let backend = Arc::new(CountingStt::new(Duration::from_millis(5)));
        let (dispatcher, channel, closed) = dispatcher_with(backend.clone());

        closed.store(true, Ordering::Release);
        dispatcher.submit(utterance(1));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(backend.completed.load(Ordering::SeqCst), 0);
        assert!(channel.posts().is_empty());
    }
}
