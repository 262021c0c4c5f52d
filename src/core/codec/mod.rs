//! Codec adapter between the voice transport and the engine.
//!
//! The transport speaks Opus: fixed 20 ms packets of 48 kHz interleaved
//! stereo. Inbound packets are decoded one call per frame; the outbound
//! path accepts a continuous linear-sample stream and re-frames it into
//! 20 ms packets, zero-padding the tail so decoded duration always matches
//! encoded duration. Rate/channel conversion for backend-specific formats
//! lives in [`resample`].

pub mod mp3;
pub mod resample;
pub mod wav;

use audiopus::coder::{Decoder, Encoder};
use audiopus::{Application, Channels, SampleRate};
use bytes::Bytes;

pub use mp3::decode_mp3;
pub use resample::{downmix_to_mono, pcm16_to_f32, resample_f32, resample_i16, upmix_to_stereo};
pub use wav::render_wav;

/// Transport sample rate in Hz.
pub const TRANSPORT_SAMPLE_RATE: u32 = 48_000;
/// Transport channel count (interleaved).
pub const TRANSPORT_CHANNELS: u16 = 2;
/// Duration of one transport frame.
pub const FRAME_MILLIS: u32 = 20;
/// Samples per channel in one 20 ms frame at 48 kHz.
pub const SAMPLES_PER_FRAME: usize = (TRANSPORT_SAMPLE_RATE as usize / 1000) * FRAME_MILLIS as usize;
/// Interleaved sample count of one decoded frame.
pub const INTERLEAVED_FRAME_LEN: usize = SAMPLES_PER_FRAME * TRANSPORT_CHANNELS as usize;

/// Upper bound for one encoded Opus packet.
const MAX_PACKET_LEN: usize = 4000;

/// A block of linear audio with its format.
///
/// Utterance snapshots and decoded synthesis payloads both travel as clips;
/// backends convert to their required rate/layout via [`resample`].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Interleaved 16-bit samples.
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioClip {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Errors from the codec adapter. A decode failure skips that frame; an
/// encode failure drops the affected playback item. Neither touches the
/// session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    #[error("opus decode failed: {0}")]
    Decode(String),

    #[error("opus encode failed: {0}")]
    Encode(String),

    #[error("codec initialization failed: {0}")]
    Init(String),

    #[error("unsupported audio payload: {0}")]
    UnsupportedFormat(String),
}

/// Decodes inbound Opus packets for a single speaker.
///
/// Opus decoders are stateful per stream, so each speaker lane owns one.
pub struct FrameDecoder {
    inner: Decoder,
}

impl FrameDecoder {
    pub fn new() -> Result<Self, CodecError> {
        let inner = Decoder::new(SampleRate::Hz48000, Channels::Stereo)
            .map_err(|e| CodecError::Init(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Decode one compressed packet into interleaved 48 kHz stereo samples.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, CodecError> {
        let mut pcm = vec![0i16; INTERLEAVED_FRAME_LEN];
        let per_channel = self
            .inner
            .decode(Some(packet), &mut pcm, false)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        pcm.truncate(per_channel * TRANSPORT_CHANNELS as usize);
        Ok(pcm)
    }
}

/// Re-frames a continuous interleaved 48 kHz stereo stream into encoded
/// 20 ms Opus packets.
///
/// Samples that do not fill a whole frame are held back until the next
/// `push`; `flush` zero-pads the remainder so no audio is truncated.
pub struct StreamEncoder {
    inner: Encoder,
    pending: Vec<i16>,
}

impl StreamEncoder {
    pub fn new() -> Result<Self, CodecError> {
        let inner = Encoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio)
            .map_err(|e| CodecError::Init(e.to_string()))?;
        Ok(Self {
            inner,
            pending: Vec::with_capacity(INTERLEAVED_FRAME_LEN * 2),
        })
    }

    /// Append interleaved samples and return every complete packet they
    /// produce, in order.
    pub fn push(&mut self, samples: &[i16]) -> Result<Vec<Bytes>, CodecError> {
        self.pending.extend_from_slice(samples);
        let mut packets = Vec::new();
        while self.pending.len() >= INTERLEAVED_FRAME_LEN {
            let frame: Vec<i16> = self.pending.drain(..INTERLEAVED_FRAME_LEN).collect();
            packets.push(self.encode_frame(&frame)?);
        }
        Ok(packets)
    }

    /// Encode whatever is left, zero-padded to a full frame. Returns `None`
    /// when no samples are pending.
    pub fn flush(&mut self) -> Result<Option<Bytes>, CodecError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let mut frame = std::mem::take(&mut self.pending);
        frame.resize(INTERLEAVED_FRAME_LEN, 0);
        Ok(Some(self.encode_frame(&frame)?))
    }

    fn encode_frame(&mut self, frame: &[i16]) -> Result<Bytes, CodecError> {
        let mut out = vec![0u8; MAX_PACKET_LEN];
        let written = self
            .inner
            .encode(frame, &mut out)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        out.truncate(written);
        Ok(Bytes::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_duration_follows_rate_and_channels() {
        let clip = AudioClip {
            samples: vec![0i16; 48 * 20 * 2],
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(clip.duration_ms(), 20);

        let empty = AudioClip {
            samples: Vec::new(),
            sample_rate: 0,
            channels: 0,
        };
        assert_eq!(empty.duration_ms(), 0);
    }

    #[test]
    fn frame_constants_agree() {
        // 20 ms at 48 kHz stereo
        assert_eq!(SAMPLES_PER_FRAME, 960);
        assert_eq!(INTERLEAVED_FRAME_LEN, 1920);
    }

    #[test]
    fn stream_encoder_frames_and_pads() {
        let mut enc = StreamEncoder::new().unwrap();

        // 2.5 frames of audio: two packets now, the tail on flush.
        let samples = vec![100i16; INTERLEAVED_FRAME_LEN * 5 / 2];
        let packets = enc.push(&samples).unwrap();
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| !p.is_empty()));

        let tail = enc.flush().unwrap();
        assert!(tail.is_some());

        // Nothing pending after flush.
        assert!(enc.flush().unwrap().is_none());
    }

    #[test]
    fn decode_of_encoded_frame_preserves_duration() {
        let mut enc = StreamEncoder::new().unwrap();
        let mut dec = FrameDecoder::new().unwrap();

        let samples = vec![0i16; INTERLEAVED_FRAME_LEN];
        let packets = enc.push(&samples).unwrap();
        assert_eq!(packets.len(), 1);

        let pcm = dec.decode(&packets[0]).unwrap();
        assert_eq!(pcm.len(), INTERLEAVED_FRAME_LEN);
    }
}
