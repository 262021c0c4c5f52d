//! Playback path: synthesized payload -> outbound transport stream.

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::codec::{
    self, CodecError, StreamEncoder, TRANSPORT_SAMPLE_RATE, resample,
};
use crate::core::transport::AudioSink;
use crate::errors::EngineError;

/// Consumes one synthesized payload at a time and emits it, completely,
/// into the outbound stream. The TTS queue's consumer is the only caller,
/// which is what guarantees emissions never overlap.
#[async_trait]
pub trait Playback: Send {
    async fn play(&mut self, payload: Bytes) -> Result<(), EngineError>;

    /// Flush any transport-side residue when the queue stops.
    async fn finish(&mut self) -> Result<(), EngineError>;
}

/// Production playback: MP3 payload -> linear samples -> 48 kHz stereo ->
/// Opus packets -> sink.
pub struct OpusPlayback {
    encoder: StreamEncoder,
    sink: Box<dyn AudioSink>,
}

impl OpusPlayback {
    pub fn new(sink: Box<dyn AudioSink>) -> Result<Self, CodecError> {
        Ok(Self {
            encoder: StreamEncoder::new()?,
            sink,
        })
    }
}

#[async_trait]
impl Playback for OpusPlayback {
    async fn play(&mut self, payload: Bytes) -> Result<(), EngineError> {
        let clip = codec::decode_mp3(payload)?;

        let stereo = match clip.channels {
            1 => resample::upmix_to_stereo(&clip.samples),
            2 => clip.samples,
            n => resample::upmix_to_stereo(&resample::downmix_to_mono(&clip.samples, n)),
        };
        let resampled = resample::resample_i16(&stereo, 2, clip.sample_rate, TRANSPORT_SAMPLE_RATE);

        for packet in self.encoder.push(&resampled)? {
            self.sink.write(packet).await?;
        }
        // Pad out the item's tail so the next item starts on a clean frame.
        if let Some(tail) = self.encoder.flush()? {
            self.sink.write(tail).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), EngineError> {
        if let Some(tail) = self.encoder.flush()? {
            self.sink.write(tail).await?;
        }
        self.sink.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{MemoryGateway, VoiceGateway};

    #[tokio::test]
    async fn invalid_payload_is_a_codec_error_and_writes_nothing() {
        let gateway = MemoryGateway::new();
        let mut playback = OpusPlayback::new(gateway.open_sink().unwrap()).unwrap();

        let result = playback.play(Bytes::from_static(b"not audio")).await;
        assert!(matches!(result, Err(EngineError::Codec(_))));
        assert!(gateway.outbound_packets().is_empty());
    }

    #[tokio::test]
    async fn finish_on_an_idle_stream_is_clean() {
        let gateway = MemoryGateway::new();
        let mut playback = OpusPlayback::new(gateway.open_sink().unwrap()).unwrap();
        playback.finish().await.unwrap();
        assert!(gateway.outbound_packets().is_empty());
    }
}
