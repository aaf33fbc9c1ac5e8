use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Live counters for one connection
pub struct SessionStats {
    id: Uuid,
    connected_at: DateTime<Utc>,
    frames_in: AtomicU64,
    audio_bytes_in: AtomicU64,
    control_events: AtomicU64,
    peer: Mutex<Option<String>>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            connected_at: Utc::now(),
            frames_in: AtomicU64::new(0),
            audio_bytes_in: AtomicU64::new(0),
            control_events: AtomicU64::new(0),
            peer: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn record_frame(&self) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio(&self, bytes: usize) {
        self.audio_bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.control_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_peer(&self, name: String) {
        if let Ok(mut peer) = self.peer.lock() {
            *peer = Some(name);
        }
    }

    pub fn summary(&self, frames_out: u64) -> SessionSummary {
        let duration = Utc::now().signed_duration_since(self.connected_at);

        SessionSummary {
            session_id: self.id,
            connected_at: self.connected_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_out,
            audio_bytes_in: self.audio_bytes_in.load(Ordering::Relaxed),
            control_events: self.control_events.load(Ordering::Relaxed),
            peer: self.peer.lock().ok().and_then(|peer| peer.clone()),
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a session's counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Connection identifier used in logs
    pub session_id: Uuid,

    /// When the connection was accepted
    pub connected_at: DateTime<Utc>,

    /// Time since the connection was accepted
    pub duration_secs: f64,

    pub frames_in: u64,
    pub frames_out: u64,
    pub audio_bytes_in: u64,
    pub control_events: u64,

    /// Name announced by a satellite peer, if any
    pub peer: Option<String>,
}
