use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::task::BackgroundTask;
use crate::audio::{AudioFormat, CaptureAdapter, CaptureFactory};
use crate::protocol::FrameWriter;

/// Live capture streaming: owns the capture adapter lifecycle and the relay
/// loop that forwards captured PCM as audio frames
pub struct AudioStreamSession {
    state: Mutex<CaptureState>,
    factory: Arc<dyn CaptureFactory>,
    format: AudioFormat,
    chunk_ms: u64,
    writer: Arc<FrameWriter>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

#[derive(Default)]
struct CaptureState {
    relay: Option<BackgroundTask>,
}

impl AudioStreamSession {
    pub fn new(
        factory: Arc<dyn CaptureFactory>,
        format: AudioFormat,
        chunk_ms: u64,
        writer: Arc<FrameWriter>,
        tracker: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: Mutex::new(CaptureState::default()),
            factory,
            format,
            chunk_ms,
            writer,
            tracker,
            cancel,
        }
    }

    /// Start streaming; a no-op while a relay is already running
    ///
    /// Failing to open the adapter leaves streaming off and is not reported to
    /// the peer.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;

        if state.relay.as_ref().is_some_and(BackgroundTask::is_running) {
            debug!("Capture already streaming");
            return;
        }

        // Reap a relay that ended on its own (EOF or adapter error)
        if let Some(finished) = state.relay.take() {
            finished.cancel_and_wait().await;
        }

        let adapter = match self.factory.open(&self.format).await {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("Failed to open capture adapter: {:#}", e);
                return;
            }
        };

        info!("Streaming started ({})", adapter.name());

        let writer = Arc::clone(&self.writer);
        let chunk_frames = self.format.frames_for_ms(self.chunk_ms).max(1);
        let fallback_frame_size = self.format.bytes_per_frame();

        state.relay = Some(BackgroundTask::spawn(&self.tracker, &self.cancel, move |token| {
            relay_loop(adapter, writer, chunk_frames, fallback_frame_size, token)
        }));
    }

    /// Stop streaming and release the adapter; a no-op when not streaming
    pub async fn stop(&self) {
        let relay = self.state.lock().await.relay.take();

        match relay {
            Some(task) => {
                task.cancel_and_wait().await;
                info!("Streaming stopped");
            }
            None => debug!("Capture not streaming"),
        }
    }

    pub async fn is_active(&self) -> bool {
        let state = self.state.lock().await;
        state.relay.as_ref().is_some_and(BackgroundTask::is_running)
    }
}

async fn relay_loop(
    mut adapter: Box<dyn CaptureAdapter>,
    writer: Arc<FrameWriter>,
    chunk_frames: usize,
    fallback_frame_size: usize,
    cancel: CancellationToken,
) {
    let frame_size = match adapter.frame_size() {
        0 => fallback_frame_size,
        n => n,
    };
    let mut buf = vec![0u8; chunk_frames * frame_size];
    let mut chunks: u64 = 0;

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = adapter.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                info!("Capture {} reached end of stream", adapter.name());
                break;
            }
            Ok(n) => {
                if let Err(e) = writer.send_audio(buf[..n].to_vec()).await {
                    warn!("Failed to write audio frame: {}", e);
                    break;
                }
                chunks += 1;
            }
            Err(e) => {
                warn!("Capture read failed: {:#}", e);
                break;
            }
        }
    }

    if let Err(e) = adapter.close().await {
        warn!("Failed to close capture adapter: {:#}", e);
    }

    debug!("Capture relay stopped after {} chunks", chunks);
}
