//! Silence-based utterance endpointing.
//!
//! One [`SpeakerBuffer`] per active speaker accumulates decoded samples and
//! keeps a single armed silence deadline. Every appended frame rearms the
//! deadline (cancel-and-replace, never two timers alive); when it elapses
//! with no intervening frame the accumulated buffer is swapped out
//! atomically and emitted as an [`Utterance`]. The state machine is
//! Empty → Buffering → Empty; the flush itself is instantaneous.
//!
//! # Safety against stale deadlines
//!
//! Appends bump a generation counter under the same lock that guards the
//! samples; the deadline task re-checks the generation under that lock
//! before swapping. A deadline that was rearmed away can therefore never
//! flush, even if its task had already woken when the rearm happened.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::core::codec::{AudioClip, TRANSPORT_CHANNELS, TRANSPORT_SAMPLE_RATE};
use crate::core::transport::SpeakerId;

/// Silence gap that ends an utterance.
///
/// Balances utterance completeness against latency; natural mid-sentence
/// pauses stay under it.
pub const SILENCE_THRESHOLD: Duration = Duration::from_millis(500);

/// Endpointing parameters for one session.
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    pub silence_threshold: Duration,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            silence_threshold: SILENCE_THRESHOLD,
            sample_rate: TRANSPORT_SAMPLE_RATE,
            channels: TRANSPORT_CHANNELS,
        }
    }
}

/// The audio captured for one speaker between two silence-triggered
/// flushes. Consumed exactly once by the transcription dispatcher.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub speaker: SpeakerId,
    pub audio: AudioClip,
}

/// Accumulates one speaker's decoded samples and owns their silence
/// deadline. Single-writer on the ingest path; the deadline task only
/// read-and-swaps.
pub struct SpeakerBuffer {
    speaker: SpeakerId,
    config: EndpointConfig,
    samples: Arc<Mutex<Vec<i16>>>,
    generation: Arc<AtomicU64>,
    deadline: Mutex<Option<JoinHandle<()>>>,
    flush_tx: UnboundedSender<Utterance>,
}

impl SpeakerBuffer {
    pub fn new(
        speaker: SpeakerId,
        config: EndpointConfig,
        flush_tx: UnboundedSender<Utterance>,
    ) -> Self {
        Self {
            speaker,
            config,
            samples: Arc::new(Mutex::new(Vec::new())),
            generation: Arc::new(AtomicU64::new(0)),
            deadline: Mutex::new(None),
            flush_tx,
        }
    }

    /// Append one decoded frame and rearm the silence deadline.
    ///
    /// This is the whole ingest-path cost for a frame: lock, extend, bump,
    /// abort-and-respawn the timer. No I/O, no awaits.
    pub fn push_frame(&self, pcm: &[i16]) {
        let generation = {
            let mut samples = self.samples.lock();
            samples.extend_from_slice(pcm);
            self.generation.fetch_add(1, Ordering::AcqRel) + 1
        };
        trace!(speaker = %self.speaker, samples = pcm.len(), "frame buffered");
        self.arm_deadline(generation);
    }

    fn arm_deadline(&self, generation: u64) {
        let speaker = self.speaker;
        let threshold = self.config.silence_threshold;
        let samples = Arc::clone(&self.samples);
        let current_generation = Arc::clone(&self.generation);
        let flush_tx = self.flush_tx.clone();
        let sample_rate = self.config.sample_rate;
        let channels = self.config.channels;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(threshold).await;

            let flushed = {
                let mut samples = samples.lock();
                // A newer frame rearmed the deadline; this one is stale.
                if current_generation.load(Ordering::Acquire) != generation {
                    return;
                }
                std::mem::take(&mut *samples)
            };

            if flushed.is_empty() {
                return;
            }

            let utterance = Utterance {
                speaker,
                audio: AudioClip {
                    samples: flushed,
                    sample_rate,
                    channels,
                },
            };
            debug!(
                speaker = %speaker,
                duration_ms = utterance.audio.duration_ms(),
                "silence deadline elapsed, flushing utterance"
            );
            let _ = flush_tx.send(utterance);
        });

        let mut slot = self.deadline.lock();
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the pending deadline and discard buffered samples.
    /// Called during session teardown.
    pub fn cancel(&self) {
        // Invalidate any deadline task that already woke.
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = self.deadline.lock().take() {
            handle.abort();
        }
        self.samples.lock().clear();
    }

    /// Samples currently buffered (test/diagnostic accessor).
    pub fn buffered_len(&self) -> usize {
        self.samples.lock().len()
    }
}

impl Drop for SpeakerBuffer {
    fn drop(&mut self) {
        if let Some(handle) = self.deadline.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_config() -> EndpointConfig {
        EndpointConfig {
            silence_threshold: Duration::from_millis(500),
            sample_rate: 48_000,
            channels: 2,
        }
    }

    /// 20 ms of constant-valued stereo samples.
    fn frame(value: i16) -> Vec<i16> {
        vec![value; 960 * 2]
    }

    #[tokio::test(start_paused = true)]
    async fn contiguous_frames_flush_once_after_silence() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let buffer = SpeakerBuffer::new(SpeakerId(1), test_config(), tx);

        // Three frames 20 ms apart, all gaps under the threshold.
        for value in [1, 2, 3] {
            buffer.push_frame(&frame(value));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Nothing yet: the last rearm is still pending.
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;

        let utterance = rx.try_recv().expect("one flush");
        assert_eq!(utterance.speaker, SpeakerId(1));
        // 3 frames x 20 ms concatenated.
        assert_eq!(utterance.audio.samples.len(), 3 * 960 * 2);
        assert_eq!(utterance.audio.duration_ms(), 60);
        assert_eq!(&utterance.audio.samples[..4], &[1, 1, 1, 1]);
        assert_eq!(&utterance.audio.samples[utterance.audio.samples.len() - 4..], &[3, 3, 3, 3]);

        // Exactly one flush, and the buffer reset to empty.
        assert!(rx.try_recv().is_err());
        assert_eq!(buffer.buffered_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gap_over_threshold_splits_utterances() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let buffer = SpeakerBuffer::new(SpeakerId(1), test_config(), tx);

        buffer.push_frame(&frame(1));
        tokio::time::sleep(Duration::from_millis(600)).await;
        buffer.push_frame(&frame(2));
        tokio::time::sleep(Duration::from_millis(600)).await;

        let first = rx.try_recv().expect("first flush");
        let second = rx.try_recv().expect("second flush");
        assert!(rx.try_recv().is_err());

        assert_eq!(first.audio.samples, frame(1));
        assert_eq!(second.audio.samples, frame(2));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_keeps_postponing_the_flush() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let buffer = SpeakerBuffer::new(SpeakerId(1), test_config(), tx);

        // 10 frames at 400 ms gaps: each rearm lands before the 500 ms
        // deadline, so no flush happens until the stream stops.
        for _ in 0..10 {
            buffer.push_frame(&frame(7));
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let utterance = rx.try_recv().expect("single flush of all frames");
        assert_eq!(utterance.audio.samples.len(), 10 * 960 * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn speakers_flush_independently() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let x = SpeakerBuffer::new(SpeakerId(1), test_config(), tx.clone());
        let y = SpeakerBuffer::new(SpeakerId(2), test_config(), tx);

        x.push_frame(&frame(1));
        tokio::time::sleep(Duration::from_millis(400)).await;
        // Y starts later and keeps accumulating while X goes silent.
        y.push_frame(&frame(2));
        tokio::time::sleep(Duration::from_millis(200)).await;

        // X's deadline (500 ms after its only frame) has fired; Y's has not.
        let flushed = rx.try_recv().expect("x flushed");
        assert_eq!(flushed.speaker, SpeakerId(1));
        assert!(rx.try_recv().is_err());
        assert!(y.buffered_len() > 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let flushed = rx.try_recv().expect("y flushed");
        assert_eq!(flushed.speaker, SpeakerId(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_audio() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let buffer = SpeakerBuffer::new(SpeakerId(1), test_config(), tx);

        buffer.push_frame(&frame(1));
        buffer.cancel();
        tokio::time::sleep(Duration::from_millis(700)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(buffer.buffered_len(), 0);
    }
}
