use std::f64::consts::TAU;

use anyhow::Result;
use futures::stream::{self, StreamExt};

use super::{AudioChunkStream, Synthesizer};
use crate::audio::AudioFormat;

/// Placeholder synthesizer settings
#[derive(Debug, Clone)]
pub struct ToneConfig {
    /// Tone frequency in Hz
    pub tone_hz: f64,
    /// Peak amplitude as a fraction of full scale
    pub amplitude: f64,
    /// Shortest utterance in seconds
    pub min_secs: f64,
    /// Longest utterance in seconds
    pub max_secs: f64,
    /// Extra duration per character of input text
    pub secs_per_char: f64,
    /// Duration of each emitted chunk in milliseconds
    pub chunk_ms: u64,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            tone_hz: 660.0,
            amplitude: 0.2,
            min_secs: 0.6,
            max_secs: 4.0,
            secs_per_char: 0.04,
            chunk_ms: 20,
        }
    }
}

/// Emits a sine tone whose length grows with the text, clamped to bounds
#[derive(Debug, Clone, Default)]
pub struct ToneSynthesizer {
    config: ToneConfig,
}

impl ToneSynthesizer {
    pub fn new(config: ToneConfig) -> Self {
        Self { config }
    }

    /// Utterance duration for `text`
    pub fn duration_secs(&self, text: &str) -> f64 {
        let raw = self.config.min_secs + text.chars().count() as f64 * self.config.secs_per_char;
        raw.clamp(self.config.min_secs, self.config.max_secs.max(self.config.min_secs))
    }

    /// Number of chunks emitted for `text`
    pub fn chunk_count(&self, text: &str) -> usize {
        let duration_ms = (self.duration_secs(text) * 1000.0).round() as u64;
        duration_ms.div_ceil(self.config.chunk_ms.max(1)) as usize
    }
}

#[async_trait::async_trait]
impl Synthesizer for ToneSynthesizer {
    async fn synthesize(&self, text: &str, format: &AudioFormat) -> Result<AudioChunkStream> {
        let chunks = ToneChunks {
            remaining: self.chunk_count(text),
            frames_per_chunk: format.frames_for_ms(self.config.chunk_ms.max(1)),
            channels: format.channels.max(1) as usize,
            amplitude: self.config.amplitude * i16::MAX as f64,
            step: TAU * self.config.tone_hz / format.sample_rate.max(1) as f64,
            phase: 0.0,
        };

        Ok(stream::iter(chunks.map(Ok)).boxed())
    }

    fn name(&self) -> &str {
        "tone"
    }
}

/// Phase-continuous sine chunks
struct ToneChunks {
    remaining: usize,
    frames_per_chunk: usize,
    channels: usize,
    amplitude: f64,
    step: f64,
    phase: f64,
}

impl Iterator for ToneChunks {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let mut chunk = Vec::with_capacity(self.frames_per_chunk * self.channels * 2);
        for _ in 0..self.frames_per_chunk {
            let sample = (self.phase.sin() * self.amplitude) as i16;
            for _ in 0..self.channels {
                chunk.extend_from_slice(&sample.to_le_bytes());
            }
            self.phase += self.step;
            if self.phase > TAU {
                self.phase -= TAU;
            }
        }

        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_clamped() {
        let synth = ToneSynthesizer::default();

        assert!((synth.duration_secs("") - 0.6).abs() < 1e-9);
        assert!((synth.duration_secs("hi") - 0.68).abs() < 1e-9);
        assert!((synth.duration_secs(&"x".repeat(500)) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_chunk_count_monotonic_in_text_length() {
        let synth = ToneSynthesizer::default();

        assert_eq!(synth.chunk_count(""), 30);
        assert_eq!(synth.chunk_count("hi"), 34);
        assert!(synth.chunk_count("hello there") >= synth.chunk_count("hi"));
        assert_eq!(synth.chunk_count(&"x".repeat(1000)), 200);
    }

    #[tokio::test]
    async fn test_chunks_fill_every_channel() {
        let synth = ToneSynthesizer::default();
        let format = AudioFormat::new(16000, 2);

        let chunks: Vec<Vec<u8>> = synth
            .synthesize("hi", &format)
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(chunks.len(), 34);
        assert!(chunks.iter().all(|c| c.len() == 320 * 4));

        // Left and right carry the same sample
        let first = &chunks[0];
        assert_eq!(first[4..6], first[6..8]);
        assert_ne!(first[4..6], [0, 0]);
    }
}
