//! Speech synthesis collaborators
//!
//! The session only needs "give me a stream of PCM chunks for this text".
//! `ToneSynthesizer` is a placeholder that emits a sine tone whose length
//! follows the text length; a real engine can implement `Synthesizer`
//! without touching the session state machine.

mod tone;

use anyhow::Result;
use futures::stream::BoxStream;

use crate::audio::AudioFormat;

pub use tone::{ToneConfig, ToneSynthesizer};

/// Stream of s16le PCM chunks, each sized for one pacing interval
pub type AudioChunkStream = BoxStream<'static, Result<Vec<u8>>>;

#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text` in the session's wire format
    async fn synthesize(&self, text: &str, format: &AudioFormat) -> Result<AudioChunkStream>;

    /// Synthesizer name for logging
    fn name(&self) -> &str;
}
