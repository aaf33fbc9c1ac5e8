// PCM conversions used before handing audio to a recognizer
//
// Input is interleaved s16le; recognizers want mono at their own rate.

use super::backend::AudioFormat;

/// Decode s16le bytes into samples; a trailing odd byte is dropped
pub fn bytes_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as s16le bytes
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Downmix interleaved audio to mono by averaging each frame
///
/// Incomplete trailing frames are dropped.
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Resample mono audio by linear interpolation
pub fn resample_linear(samples: &[i16], in_rate: u32, out_rate: u32) -> Vec<i16> {
    if in_rate == out_rate || samples.is_empty() || in_rate == 0 || out_rate == 0 {
        return samples.to_vec();
    }

    let ratio = in_rate as f64 / out_rate as f64;
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    if out_len <= 1 {
        return samples.to_vec();
    }

    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            if idx >= last {
                return samples[last];
            }
            let frac = pos - idx as f64;
            let s0 = samples[idx] as f64;
            let s1 = samples[idx + 1] as f64;
            (s0 * (1.0 - frac) + s1 * frac) as i16
        })
        .collect()
}

/// Turn buffered wire PCM into mono samples at `target_rate`
pub fn prepare_for_recognizer(pcm: &[u8], format: &AudioFormat, target_rate: u32) -> Vec<i16> {
    let samples = bytes_to_samples(pcm);
    let mono = downmix_to_mono(&samples, format.channels);
    resample_linear(&mono, format.sample_rate, target_rate)
}
