//! Ordered text-to-speech pipeline.
//!
//! An unbounded FIFO with a single consumer: synthesis for queued items is
//! prefetched concurrently (bounded by [`MAX_CONCURRENT_SYNTHESIS`]), but
//! the consumer awaits results strictly in enqueue order and is the only
//! writer to the outbound stream, so emitted audio never overlaps and
//! never reorders. Disabling closes intake and waits for the item being
//! played to finish; queued-but-unplayed items are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::playback::Playback;
use crate::core::tts::{Synthesizer, TtsError};

/// Simultaneous synthesis calls allowed per session. Gates prefetch only;
/// emission is always sequential.
pub const MAX_CONCURRENT_SYNTHESIS: usize = 10;

struct TtsJob {
    seq: u64,
    result_rx: oneshot::Receiver<Result<Bytes, TtsError>>,
}

#[derive(Default)]
struct QueueState {
    intake: Option<UnboundedSender<TtsJob>>,
    consumer: Option<JoinHandle<()>>,
    next_seq: u64,
}

pub struct TtsQueue {
    synthesizer: Arc<dyn Synthesizer>,
    synth_slots: Arc<Semaphore>,
    state: Mutex<QueueState>,
    stop: Arc<AtomicBool>,
}

impl TtsQueue {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            synthesizer,
            synth_slots: Arc::new(Semaphore::new(MAX_CONCURRENT_SYNTHESIS)),
            state: Mutex::new(QueueState::default()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().intake.is_some()
    }

    /// Start the single background consumer writing into `playback`.
    /// No-op if already enabled.
    pub fn enable(&self, mut playback: Box<dyn Playback>) {
        let mut state = self.state.lock();
        if state.intake.is_some() {
            return;
        }

        self.stop.store(false, Ordering::Release);
        let (intake, mut jobs) = mpsc::unbounded_channel::<TtsJob>();
        let stop = Arc::clone(&self.stop);

        let consumer = tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                if stop.load(Ordering::Acquire) {
                    debug!(seq = job.seq, "queue disabled; dropping unplayed item");
                    break;
                }
                match job.result_rx.await {
                    Ok(Ok(audio)) => {
                        if let Err(e) = playback.play(audio).await {
                            warn!(seq = job.seq, error = %e, "playback failed; skipping item");
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(seq = job.seq, error = %e, "synthesis failed; skipping item");
                    }
                    Err(_) => {
                        warn!(seq = job.seq, "synthesis worker vanished; skipping item");
                    }
                }
            }
            if let Err(e) = playback.finish().await {
                debug!(error = %e, "outbound stream flush failed during stop");
            }
        });

        state.intake = Some(intake);
        state.consumer = Some(consumer);
    }

    /// Queue one text item. Synthesis starts as soon as a slot frees up;
    /// emission order is the enqueue order regardless of which synthesis
    /// finishes first. Silently ignored while the queue is disabled.
    pub fn enqueue(&self, text: String) {
        let (seq, intake) = {
            let mut state = self.state.lock();
            let Some(intake) = state.intake.clone() else {
                return;
            };
            let seq = state.next_seq;
            state.next_seq += 1;
            (seq, intake)
        };

        let (result_tx, result_rx) = oneshot::channel();
        let synthesizer = Arc::clone(&self.synthesizer);
        let slots = Arc::clone(&self.synth_slots);
        tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };
            let result = synthesizer.synthesize(&text).await;
            let _ = result_tx.send(result);
        });

        let _ = intake.send(TtsJob { seq, result_rx });
    }

    /// Close intake and wait for the consumer to finish the item it is
    /// currently playing. Idempotent.
    pub async fn disable(&self) {
        let (intake, consumer) = {
            let mut state = self.state.lock();
            (state.intake.take(), state.consumer.take())
        };
        if intake.is_none() && consumer.is_none() {
            return;
        }

        self.stop.store(true, Ordering::Release);
        drop(intake);
        if let Some(consumer) = consumer {
            let _ = consumer.await;
        }
    }
}
