//! Registry contract and session teardown behaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use murmur::core::codec::{AudioClip, INTERLEAVED_FRAME_LEN, StreamEncoder};
use murmur::core::session::{SessionConfig, SessionRegistry, VoiceSession};
use murmur::core::stt::{SttConfig, SttError, Transcriber};
use murmur::core::transport::{
    CallId, ChannelId, MemoryChannel, MemoryGateway, SpeakerId, TextChannel, VoiceFrame,
    VoiceGateway,
};
use murmur::core::tts::{Synthesizer, TtsError};
use murmur::errors::{EngineError, SessionError};
use murmur::settings::SettingsStore;

fn registry_with_settings() -> (SessionRegistry, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let settings =
        Arc::new(SettingsStore::load(dir.path().join("voice_settings.json")).unwrap());
    let config = SessionConfig {
        stt: SttConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    (SessionRegistry::new(config, settings), dir)
}

fn transports() -> (Arc<MemoryGateway>, Arc<MemoryChannel>) {
    (
        Arc::new(MemoryGateway::new()),
        Arc::new(MemoryChannel::new(ChannelId(300))),
    )
}

#[tokio::test]
async fn join_get_leave_contract() {
    let (registry, _dir) = registry_with_settings();
    let (gateway, channel) = transports();

    assert!(registry.get(CallId(1)).is_none());

    let session = registry
        .join(
            CallId(1),
            Arc::clone(&gateway) as Arc<dyn VoiceGateway>,
            Arc::clone(&channel) as Arc<dyn TextChannel>,
        )
        .unwrap();
    assert_eq!(session.call_id(), CallId(1));
    assert!(registry.get(CallId(1)).is_some());
    assert_eq!(registry.active_calls(), vec![CallId(1)]);

    let removed = registry.leave(CallId(1)).await.unwrap();
    assert!(removed.is_closed());
    assert!(registry.get(CallId(1)).is_none());
    assert!(gateway.is_closed());
}

#[tokio::test]
async fn double_join_is_rejected() {
    let (registry, _dir) = registry_with_settings();
    let (gateway, channel) = transports();

    registry
        .join(
            CallId(1),
            Arc::clone(&gateway) as Arc<dyn VoiceGateway>,
            Arc::clone(&channel) as Arc<dyn TextChannel>,
        )
        .unwrap();

    let err = registry
        .join(
            CallId(1),
            Arc::clone(&gateway) as Arc<dyn VoiceGateway>,
            Arc::clone(&channel) as Arc<dyn TextChannel>,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Session(SessionError::AlreadyActive(1))
    ));

    // A different call id is fine.
    registry
        .join(
            CallId(2),
            Arc::clone(&gateway) as Arc<dyn VoiceGateway>,
            Arc::clone(&channel) as Arc<dyn TextChannel>,
        )
        .unwrap();
}

#[tokio::test]
async fn leave_without_join_is_rejected() {
    let (registry, _dir) = registry_with_settings();
    let err = registry.leave(CallId(99)).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Session(SessionError::NotActive(99))
    ));
}

#[tokio::test]
async fn rejoin_after_leave_succeeds_immediately() {
    let (registry, _dir) = registry_with_settings();
    let (gateway, channel) = transports();

    registry
        .join(
            CallId(1),
            Arc::clone(&gateway) as Arc<dyn VoiceGateway>,
            Arc::clone(&channel) as Arc<dyn TextChannel>,
        )
        .unwrap();
    registry.leave(CallId(1)).await.unwrap();

    let (gateway2, channel2) = transports();
    let session = registry
        .join(
            CallId(1),
            gateway2 as Arc<dyn VoiceGateway>,
            channel2 as Arc<dyn TextChannel>,
        )
        .unwrap();
    assert!(!session.is_closed());
}

/// Backend slow enough that `leave` lands mid-transcription.
struct SlowStt {
    completed: AtomicUsize,
}

#[async_trait]
impl Transcriber for SlowStt {
    async fn transcribe(&self, _clip: &AudioClip) -> Result<String, SttError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok("finished late".to_string())
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

struct NoopSynth;

#[async_trait]
impl Synthesizer for NoopSynth {
    async fn synthesize(&self, _text: &str) -> Result<Bytes, TtsError> {
        Ok(Bytes::from_static(b"unused"))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[tokio::test(start_paused = true)]
async fn in_flight_transcription_completes_but_never_posts_after_teardown() {
    let dir = tempfile::tempdir().unwrap();
    let settings =
        Arc::new(SettingsStore::load(dir.path().join("voice_settings.json")).unwrap());
    let (gateway, channel) = transports();
    let stt = Arc::new(SlowStt {
        completed: AtomicUsize::new(0),
    });

    let session = VoiceSession::with_backends(
        CallId(1),
        Arc::clone(&gateway) as Arc<dyn VoiceGateway>,
        Arc::clone(&channel) as Arc<dyn TextChannel>,
        settings,
        SessionConfig::default(),
        Arc::clone(&stt) as Arc<dyn Transcriber>,
        Arc::new(NoopSynth),
    );
    session.enable_transcription().unwrap();

    // One utterance worth of audio, flushed by silence.
    let mut encoder = StreamEncoder::new().unwrap();
    let packets = encoder.push(&vec![400i16; INTERLEAVED_FRAME_LEN]).unwrap();
    gateway.emit_frame(VoiceFrame {
        speaker: SpeakerId(1),
        payload: packets[0].clone(),
        timestamp_ms: 0,
    });
    // The flush fires at 500 ms and the backend holds its slot for another
    // 100 ms; stop just past the flush so teardown lands mid-call.
    tokio::time::sleep(Duration::from_millis(505)).await;
    session.shutdown().await;

    // Let the in-flight call run to completion.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stt.completed.load(Ordering::SeqCst), 1);
    // Its output was discarded: nothing posted after teardown.
    assert!(channel.posts().is_empty());

    // No listeners remain attached.
    assert_eq!(gateway.subscriber_count(), 0);
    assert_eq!(channel.subscriber_count(), 0);
}

#[tokio::test]
async fn shutdown_all_drains_every_session() {
    let (registry, _dir) = registry_with_settings();
    for call in [1u64, 2, 3] {
        let (gateway, channel) = transports();
        registry
            .join(
                CallId(call),
                gateway as Arc<dyn VoiceGateway>,
                channel as Arc<dyn TextChannel>,
            )
            .unwrap();
    }
    assert_eq!(registry.active_calls().len(), 3);

    registry.shutdown_all().await;
    assert!(registry.active_calls().is_empty());
    // Idempotent on an empty registry.
    registry.shutdown_all().await;
}

#[tokio::test]
async fn commands_on_a_closed_session_are_rejected() {
    let (registry, _dir) = registry_with_settings();
    let (gateway, channel) = transports();

    let session = registry
        .join(
            CallId(1),
            gateway as Arc<dyn VoiceGateway>,
            channel as Arc<dyn TextChannel>,
        )
        .unwrap();
    registry.leave(CallId(1)).await.unwrap();

    assert!(session.enable_transcription().is_err());
    assert!(session.enable_tts().await.is_err());
}

#[tokio::test]
async fn backend_variant_switch_validates_state() {
    let (registry, _dir) = registry_with_settings();
    let (gateway, channel) = transports();

    let session = registry
        .join(
            CallId(1),
            gateway as Arc<dyn VoiceGateway>,
            channel as Arc<dyn TextChannel>,
        )
        .unwrap();

    // Already on the remote backend.
    assert!(
        session
            .set_backend(murmur::core::stt::SttBackendKind::Remote)
            .is_err()
    );

    // Switching to local needs the whisper feature; without it the error
    // is a configuration error, with it a cache-path error — either way
    // the session stays on the remote backend.
    let result = session.set_backend(murmur::core::stt::SttBackendKind::Local);
    assert!(result.is_err());
    assert_eq!(
        session.backend_kind(),
        murmur::core::stt::SttBackendKind::Remote
    );
}
