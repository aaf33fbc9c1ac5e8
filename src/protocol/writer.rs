use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use super::events::{self, ControlEvent};
use super::frame::{write_frame, Frame, FrameError};

/// Boxed outbound half of a connection
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Outbound write gate shared by every frame producer of a session
///
/// Each `send` writes one frame and flushes it while holding the lock, so
/// frames from concurrent producers never interleave on the wire.
pub struct FrameWriter {
    out: Mutex<BufWriter<BoxedWriter>>,
    frames_written: AtomicU64,
}

impl FrameWriter {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        let boxed: BoxedWriter = Box::new(writer);
        Self {
            out: Mutex::new(BufWriter::with_capacity(4096, boxed)),
            frames_written: AtomicU64::new(0),
        }
    }

    /// Write one frame and flush it
    pub async fn send(&self, frame: &Frame) -> Result<(), FrameError> {
        let mut out = self.out.lock().await;
        write_frame(&mut *out, frame).await?;
        out.flush().await?;
        self.frames_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Encode and send a control event
    pub async fn send_event(&self, event: &ControlEvent) -> Result<()> {
        let payload = events::encode(event)
            .with_context(|| format!("Failed to encode {} event", event.event_type()))?;
        self.send(&Frame::control(payload))
            .await
            .with_context(|| format!("Failed to write {} event", event.event_type()))
    }

    /// Send raw PCM as an audio frame
    pub async fn send_audio(&self, pcm: Vec<u8>) -> Result<(), FrameError> {
        self.send(&Frame::audio(pcm)).await
    }

    /// Flush anything buffered and shut the outbound half down
    pub async fn shutdown(&self) -> Result<(), FrameError> {
        let mut out = self.out.lock().await;
        out.flush().await?;
        out.shutdown().await?;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }
}
