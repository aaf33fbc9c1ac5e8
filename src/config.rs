use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::audio::{AudioFormat, CaptureFactory, CaptureSource, SAMPLE_FORMAT};
use crate::protocol::DEFAULT_MAX_FRAME_BYTES;
use crate::recognizer::{Recognizer, StaticRecognizer, WhisperCli, WhisperConfig};
use crate::session::{Adapters, AsrSettings, SessionConfig};
use crate::tts::{ToneConfig, ToneSynthesizer};

/// Configuration file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "config/ion";

/// Prefix for environment overrides, e.g. `ION_ASR__BACKEND=whisper`
pub const ENV_PREFIX: &str = "ION";

const FALLBACK_PARTIAL_INTERVAL_MS: u64 = 2000;
const FALLBACK_WINDOW_MS: u64 = 6000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub capture: CaptureConfig,
    pub asr: AsrConfig,
    pub tts: TtsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Stdio,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: Transport,
    pub addr: String,
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Tcp,
            addr: "0.0.0.0:10300".to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: String,
    pub chunk_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            format: SAMPLE_FORMAT.to_string(),
            chunk_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    Parec,
    Command,
    Silence,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub backend: CaptureBackend,
    /// Shell command for the `command` backend
    pub command: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::Parec,
            command: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AsrBackend {
    Mock,
    Whisper,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    pub backend: AsrBackend,
    pub whisper_cli: String,
    pub whisper_model: String,
    pub partial_interval_ms: u64,
    pub window_ms: u64,
    pub min_audio_ms: u64,
    pub timeout_secs: u64,
    /// Default language hint; empty lets the recognizer detect it
    pub language: String,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            backend: AsrBackend::Mock,
            whisper_cli: String::new(),
            whisper_model: String::new(),
            partial_interval_ms: 1000,
            window_ms: 6000,
            min_audio_ms: 500,
            timeout_secs: 30,
            language: String::new(),
        }
    }
}

/// Placeholder tone synthesizer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub tone_hz: f64,
    pub amplitude: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    pub secs_per_char: f64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        let tone = ToneConfig::default();
        Self {
            tone_hz: tone.tone_hz,
            amplitude: tone.amplitude,
            min_secs: tone.min_secs,
            max_secs: tone.max_secs,
            secs_per_char: tone.secs_per_char,
        }
    }
}

impl Config {
    /// Load from an optional file then `ION_*` environment overrides
    ///
    /// An explicitly named file must exist; the default path is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::with_name(path),
            None => config::File::with_name(DEFAULT_CONFIG_PATH).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to load configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Reject unusable settings and repair recoverable ones
    pub fn validate(&mut self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be positive");
        }
        if self.audio.channels == 0 {
            bail!("audio.channels must be positive");
        }
        if self.audio.format != SAMPLE_FORMAT {
            bail!(
                "unsupported audio.format {:?} (only {} is supported)",
                self.audio.format,
                SAMPLE_FORMAT
            );
        }
        if self.audio.chunk_ms == 0 {
            bail!("audio.chunk_ms must be positive");
        }
        if self.server.max_frame_bytes == 0 {
            bail!("server.max_frame_bytes must be positive");
        }

        if self.capture.backend == CaptureBackend::Command && self.capture.command.trim().is_empty() {
            bail!("capture.command is required for the command capture backend");
        }

        if self.asr.backend == AsrBackend::Whisper {
            if self.asr.whisper_cli.trim().is_empty() {
                bail!("asr.whisper_cli is required for the whisper backend");
            }
            if self.asr.whisper_model.trim().is_empty() {
                bail!("asr.whisper_model is required for the whisper backend");
            }
        }

        if self.asr.partial_interval_ms == 0 {
            warn!(
                "asr.partial_interval_ms must be positive, using {}ms",
                FALLBACK_PARTIAL_INTERVAL_MS
            );
            self.asr.partial_interval_ms = FALLBACK_PARTIAL_INTERVAL_MS;
        }
        if self.asr.window_ms == 0 {
            warn!("asr.window_ms must be positive, using {}ms", FALLBACK_WINDOW_MS);
            self.asr.window_ms = FALLBACK_WINDOW_MS;
        }
        if self.asr.timeout_secs == 0 {
            bail!("asr.timeout_secs must be positive");
        }

        Ok(())
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.audio.sample_rate, self.audio.channels)
    }

    /// Immutable per-session settings derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            format: self.format(),
            chunk_ms: self.audio.chunk_ms,
            max_frame_bytes: self.server.max_frame_bytes,
            asr: AsrSettings {
                partial_interval: Duration::from_millis(self.asr.partial_interval_ms),
                window_ms: self.asr.window_ms,
                min_audio_ms: self.asr.min_audio_ms,
                default_language: self.asr.language.trim().to_string(),
            },
        }
    }

    /// Collaborators selected by the configured backends
    pub fn build_adapters(&self) -> Result<Adapters> {
        let capture: Arc<dyn CaptureFactory> = match self.capture.backend {
            CaptureBackend::Parec => Arc::new(CaptureSource::Parec),
            CaptureBackend::Command => Arc::new(CaptureSource::Command(self.capture.command.clone())),
            CaptureBackend::Silence => Arc::new(CaptureSource::Silence),
        };

        let recognizer: Arc<dyn Recognizer> = match self.asr.backend {
            AsrBackend::Mock => Arc::new(StaticRecognizer::default()),
            AsrBackend::Whisper => {
                let model = PathBuf::from(&self.asr.whisper_model);
                if !model.exists() {
                    bail!("Whisper model not found: {}", model.display());
                }
                Arc::new(WhisperCli::new(WhisperConfig {
                    cli: PathBuf::from(&self.asr.whisper_cli),
                    model,
                    timeout: Duration::from_secs(self.asr.timeout_secs),
                }))
            }
        };

        let synthesizer = Arc::new(ToneSynthesizer::new(ToneConfig {
            tone_hz: self.tts.tone_hz,
            amplitude: self.tts.amplitude,
            min_secs: self.tts.min_secs,
            max_secs: self.tts.max_secs,
            secs_per_char: self.tts.secs_per_char,
            chunk_ms: self.audio.chunk_ms,
        }));

        Ok(Adapters {
            capture,
            recognizer,
            synthesizer,
        })
    }
}
