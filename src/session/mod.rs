//! Per-connection session management
//!
//! A `SessionCoordinator` owns one connection and drives:
//! - Capture streaming (`start`/`stop`) relayed as audio frames
//! - Speech recognition over a sliding window (`asr.start`/`asr.stop`)
//! - Speech synthesis playback (`tts.start`/`tts.stop`)
//! - Connection statistics

mod asr;
mod capture;
mod config;
mod coordinator;
mod stats;
mod task;
mod tts;

pub use asr::LISTENING_ACK;
pub use config::{Adapters, AsrSettings, SessionConfig};
pub use coordinator::SessionCoordinator;
pub use stats::{SessionStats, SessionSummary};
