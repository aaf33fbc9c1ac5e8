//! Peers that talk to an ion server
//!
//! - `probe` - one `describe` round trip, for health checks
//! - `satellite` - microphone/speaker endpoint driving a remote session

mod probe;
mod satellite;

pub use probe::{probe, PROBE_TIMEOUT};
pub use satellite::{run_satellite, SatelliteOptions, MIC_CHUNK_BYTES};
