//! 16-bit PCM WAV rendering for backend upload payloads.

use std::io::Cursor;

use super::CodecError;

/// Render interleaved 16-bit samples into an in-memory WAV container.
pub fn render_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>, CodecError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut buffer, spec)
            .map_err(|e| CodecError::UnsupportedFormat(format!("wav writer: {e}")))?;
        let mut sample_writer = writer.get_i16_writer(samples.len() as u32);
        for &sample in samples {
            sample_writer.write_sample(sample);
        }
        sample_writer
            .flush()
            .map_err(|e| CodecError::UnsupportedFormat(format!("wav write: {e}")))?;
        writer
            .finalize()
            .map_err(|e| CodecError::UnsupportedFormat(format!("wav finalize: {e}")))?;
    }
    Ok(buffer.into_inner())
}
