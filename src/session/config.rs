use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioFormat, CaptureFactory, CaptureSource};
use crate::protocol::DEFAULT_MAX_FRAME_BYTES;
use crate::recognizer::{Recognizer, StaticRecognizer};
use crate::tts::{Synthesizer, ToneSynthesizer};

/// Immutable settings shared by every session of a server
///
/// Built once at startup and handed to each session behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wire PCM layout announced in `ready` and used for capture/ASR math
    pub format: AudioFormat,

    /// Duration of each capture read and TTS chunk in milliseconds
    pub chunk_ms: u64,

    /// Largest accepted inbound frame payload
    pub max_frame_bytes: usize,

    /// Speech recognition staging
    pub asr: AsrSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            chunk_ms: 20, // 20ms slices
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            asr: AsrSettings::default(),
        }
    }
}

impl SessionConfig {
    /// Time covered by one capture read / TTS chunk
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_ms)
    }
}

#[derive(Debug, Clone)]
pub struct AsrSettings {
    /// How often partial transcriptions are attempted
    pub partial_interval: Duration,

    /// Trailing audio kept for recognition, in milliseconds
    pub window_ms: u64,

    /// Minimum buffered audio before a partial is attempted
    pub min_audio_ms: u64,

    /// Language used when `asr.start` does not name one
    pub default_language: String,
}

impl Default for AsrSettings {
    fn default() -> Self {
        Self {
            partial_interval: Duration::from_secs(1),
            window_ms: 6000,
            min_audio_ms: 500,
            default_language: String::new(),
        }
    }
}

/// External collaborators a session drives
#[derive(Clone)]
pub struct Adapters {
    pub capture: Arc<dyn CaptureFactory>,
    pub recognizer: Arc<dyn Recognizer>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Default for Adapters {
    fn default() -> Self {
        Self {
            capture: Arc::new(CaptureSource::Parec),
            recognizer: Arc::new(StaticRecognizer::default()),
            synthesizer: Arc::new(ToneSynthesizer::default()),
        }
    }
}
