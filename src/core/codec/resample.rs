//! Sample-rate and channel-layout conversion.
//!
//! Linear interpolation is enough for speech payloads on both conversion
//! paths (48 kHz transport ⇄ 16 kHz backends, arbitrary synthesis rates →
//! 48 kHz playback). The invariant that matters is duration: for a rate
//! change `a -> b`, `n` input samples produce `ceil(n * b / a)` output
//! samples, so decoded duration matches encoded duration end-to-end.

/// Resample mono or per-channel `f32` samples from `source_rate` to
/// `target_rate` by linear interpolation.
pub fn resample_f32(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let output_len = ((samples.len() as f64) / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < samples.len() {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < samples.len() {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

/// Resample interleaved `i16` samples, preserving the channel layout.
pub fn resample_i16(samples: &[i16], channels: u16, source_rate: u32, target_rate: u32) -> Vec<i16> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let channels = channels.max(1) as usize;
    let frames = samples.len() / channels;
    let mut planes: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    for (i, &s) in samples.iter().enumerate() {
        planes[i % channels].push(s as f32 / 32768.0);
    }

    let resampled: Vec<Vec<f32>> = planes
        .iter()
        .map(|p| resample_f32(p, source_rate, target_rate))
        .collect();

    let out_frames = resampled.iter().map(|p| p.len()).min().unwrap_or(0);
    let mut output = Vec::with_capacity(out_frames * channels);
    for frame in 0..out_frames {
        for plane in &resampled {
            output.push(f32_to_i16(plane[frame]));
        }
    }
    output
}

/// Average interleaved stereo down to mono.
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    match channels {
        0 | 1 => samples.to_vec(),
        _ => {
            let ch = channels as usize;
            samples
                .chunks_exact(ch)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / ch as i32) as i16
                })
                .collect()
        }
    }
}

/// Duplicate mono samples into interleaved stereo.
pub fn upmix_to_stereo(samples: &[i16]) -> Vec<i16> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.push(s);
        out.push(s);
    }
    out
}

/// Convert 16-bit PCM to normalized `f32` in [-1.0, 1.0].
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}
