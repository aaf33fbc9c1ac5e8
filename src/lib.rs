pub mod audio;
pub mod client;
pub mod config;
pub mod protocol;
pub mod recognizer;
pub mod session;
pub mod transport;
pub mod tts;

pub use audio::{AudioFormat, CaptureAdapter, CaptureFactory, CaptureSource, PlaybackAdapter};
pub use config::Config;
pub use protocol::{ControlEvent, Frame, FrameError, FrameKind, FrameWriter};
pub use recognizer::{Recognizer, RecognizerError, StaticRecognizer, WhisperCli};
pub use session::{Adapters, SessionConfig, SessionCoordinator, SessionStats, SessionSummary};
pub use tts::{Synthesizer, ToneSynthesizer};
