//! MP3 decoding for synthesis payloads.
//!
//! The synthesis backend returns MP3 bytes; playback needs linear samples.
//! Decoding runs on the TTS consumer, never on the ingest path.

use std::io::Cursor;

use bytes::Bytes;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioClip, CodecError};

/// Decode an MP3 payload into interleaved 16-bit samples.
pub fn decode_mp3(data: Bytes) -> Result<AudioClip, CodecError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| CodecError::UnsupportedFormat(format!("mp3 probe: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CodecError::UnsupportedFormat("no audio track in payload".into()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CodecError::UnsupportedFormat(format!("mp3 decoder: {e}")))?;

    let mut samples: Vec<i16> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream.
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(CodecError::Decode(format!("mp3 demux: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            // A corrupt frame is recoverable; skip it and keep decoding.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(CodecError::Decode(format!("mp3 decode: {e}"))),
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(CodecError::UnsupportedFormat(
            "payload decoded to no audio".into(),
        ));
    }

    Ok(AudioClip {
        samples,
        sample_rate,
        channels,
    })
}
