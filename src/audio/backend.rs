use anyhow::Result;
use tracing::info;

use super::process::CommandCapture;
use super::silence::SilentCapture;

/// Only sample encoding spoken on the wire
pub const SAMPLE_FORMAT: &str = "s16le";

/// Bytes per sample for s16le
pub const BYTES_PER_SAMPLE: usize = 2;

/// PCM stream layout (16-bit little-endian, interleaved)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes in one sample frame (one sample per channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Sample frames covering `ms` milliseconds
    pub fn frames_for_ms(&self, ms: u64) -> usize {
        (self.sample_rate as u64 * ms / 1000) as usize
    }

    /// Bytes covering `ms` milliseconds, always frame aligned
    pub fn bytes_for_ms(&self, ms: u64) -> usize {
        self.frames_for_ms(ms) * self.bytes_per_frame()
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz for Whisper
            channels: 1,        // Mono
        }
    }
}

/// Audio capture collaborator
///
/// Implementations:
/// - `CommandCapture`: raw PCM from a subprocess stdout (parec, arecord, ...)
/// - `SilentCapture`: zero PCM paced in real time, no device needed
#[async_trait::async_trait]
pub trait CaptureAdapter: Send {
    /// Read captured PCM into `buf`; `Ok(0)` signals end of stream
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Bytes per sample frame produced by this adapter
    fn frame_size(&self) -> usize;

    /// Release the underlying device/process
    async fn close(&mut self) -> Result<()>;

    /// Adapter name for logging
    fn name(&self) -> &str;
}

/// Audio playback collaborator
#[async_trait::async_trait]
pub trait PlaybackAdapter: Send {
    async fn write(&mut self, pcm: &[u8]) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens capture adapters on demand, one per `start`
#[async_trait::async_trait]
pub trait CaptureFactory: Send + Sync {
    async fn open(&self, format: &AudioFormat) -> Result<Box<dyn CaptureAdapter>>;
}

/// Capture source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// PulseAudio/PipeWire recorder (`parec --raw`)
    Parec,
    /// Arbitrary shell command writing raw PCM to stdout
    Command(String),
    /// In-process silence generator
    Silence,
}

#[async_trait::async_trait]
impl CaptureFactory for CaptureSource {
    async fn open(&self, format: &AudioFormat) -> Result<Box<dyn CaptureAdapter>> {
        let adapter: Box<dyn CaptureAdapter> = match self {
            CaptureSource::Parec => Box::new(CommandCapture::parec(format)?),
            CaptureSource::Command(command) => Box::new(CommandCapture::shell(command, format)?),
            CaptureSource::Silence => Box::new(SilentCapture::new(*format)),
        };

        info!(
            "Opened {} capture ({}Hz, {} channels)",
            adapter.name(),
            format.sample_rate,
            format.channels
        );

        Ok(adapter)
    }
}
