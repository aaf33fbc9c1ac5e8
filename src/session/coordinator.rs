use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::asr::AsrSession;
use super::capture::AudioStreamSession;
use super::config::{Adapters, SessionConfig};
use super::stats::{SessionStats, SessionSummary};
use super::tts::TtsSession;
use crate::audio::SAMPLE_FORMAT;
use crate::protocol::{self, read_frame, ControlEvent, Frame, FrameKind, FrameWriter, PROTOCOL_NAME};

/// Per-connection state machine
///
/// Owns the three subsystems (capture streaming, speech recognition, speech
/// synthesis), the shared write gate and the task group every background
/// task is spawned into. Control events are handled sequentially by the read
/// loop; background tasks only ever touch their own subsystem's state.
pub struct SessionCoordinator {
    config: Arc<SessionConfig>,
    writer: Arc<FrameWriter>,
    capture: AudioStreamSession,
    asr: AsrSession,
    tts: TtsSession,
    stats: SessionStats,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl SessionCoordinator {
    pub fn new(
        config: Arc<SessionConfig>,
        adapters: Adapters,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self::with_parent(config, adapters, writer, &CancellationToken::new())
    }

    /// Create a session that is also torn down when `parent` is cancelled
    pub fn with_parent(
        config: Arc<SessionConfig>,
        adapters: Adapters,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        parent: &CancellationToken,
    ) -> Self {
        let writer = Arc::new(FrameWriter::new(writer));
        let tracker = TaskTracker::new();
        let cancel = parent.child_token();

        let capture = AudioStreamSession::new(
            adapters.capture,
            config.format,
            config.chunk_ms,
            Arc::clone(&writer),
            tracker.clone(),
            cancel.clone(),
        );

        let asr = AsrSession::new(
            adapters.recognizer,
            config.format,
            config.asr.clone(),
            Arc::clone(&writer),
            tracker.clone(),
            cancel.clone(),
        );

        let tts = TtsSession::new(
            adapters.synthesizer,
            config.format,
            config.chunk_duration(),
            Arc::clone(&writer),
            tracker.clone(),
            cancel.clone(),
        );

        Self {
            config,
            writer,
            capture,
            asr,
            tts,
            stats: SessionStats::new(),
            tracker,
            cancel,
        }
    }

    /// Serve the connection until the peer disconnects or a fatal error
    ///
    /// Teardown always runs before returning, whatever ended the session.
    pub async fn run(&self, reader: impl AsyncRead + Unpin) -> Result<SessionSummary> {
        let span = info_span!("session", id = %self.stats.id());

        async move {
            let mut reader = reader;
            info!("Session opened");

            let result = self.read_loop(&mut reader).await;
            self.shutdown().await;

            let summary = self.summary();
            info!(
                "Session closed after {:.1}s: {} frames in, {} frames out, {} audio bytes in",
                summary.duration_secs, summary.frames_in, summary.frames_out, summary.audio_bytes_in
            );

            match result {
                Ok(()) => Ok(summary),
                Err(e) => {
                    error!("Session failed: {:#}", e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn read_loop<R: AsyncRead + Unpin>(&self, reader: &mut R) -> Result<()> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Session cancelled");
                    return Ok(());
                }
                frame = read_frame(reader, self.config.max_frame_bytes) => {
                    frame.context("Failed to read frame")?
                }
            };

            let Some(frame) = frame else {
                info!("Peer closed the connection");
                return Ok(());
            };

            self.stats.record_frame();
            self.handle_frame(frame).await?;
        }
    }

    async fn handle_frame(&self, frame: Frame) -> Result<()> {
        match frame.kind {
            FrameKind::Control => {
                let event = protocol::decode(&frame.payload).context("Failed to decode control event")?;
                if let Some(event) = event {
                    self.stats.record_event();
                    self.handle_event(event).await?;
                }
            }
            FrameKind::Audio => {
                self.stats.record_audio(frame.payload.len());
                self.asr.ingest(&frame.payload).await;
            }
            FrameKind::Other(kind) => {
                debug!("Ignoring frame of unknown kind {:#04x}", kind);
            }
        }
        Ok(())
    }

    /// Apply one control event
    pub async fn handle_event(&self, event: ControlEvent) -> Result<()> {
        debug!("Received {}", event.event_type());

        match event {
            ControlEvent::Describe => {
                let ready = ControlEvent::Ready {
                    protocol: PROTOCOL_NAME.to_string(),
                    sample_rate: self.config.format.sample_rate,
                    channels: self.config.format.channels,
                    format: SAMPLE_FORMAT.to_string(),
                };
                self.writer.send_event(&ready).await?;
            }
            ControlEvent::Start => self.capture.start().await,
            ControlEvent::Stop => self.capture.stop().await,
            ControlEvent::AsrStart { language } => self.asr.start(language).await?,
            ControlEvent::AsrStop => self.asr.stop().await,
            ControlEvent::TtsStart { text, voice, language } => {
                if voice.is_some() || language.is_some() {
                    debug!("Voice {:?} / language {:?} not supported, using defaults", voice, language);
                }
                self.tts.start(text).await;
            }
            ControlEvent::TtsStop => self.tts.stop().await,
            ControlEvent::SatelliteHello {
                name,
                sample_rate,
                channels,
                format,
                asr,
                tts,
                ..
            } => {
                info!(
                    "Satellite {} connected ({}Hz, {} channels, {}, asr: {}, tts: {})",
                    name, sample_rate, channels, format, asr, tts
                );
                self.stats.set_peer(name);
            }
            ControlEvent::SatelliteState { state } => info!("Satellite state: {}", state),
            ControlEvent::Error { message } => info!("Peer reported error: {}", message),
            other => debug!("Ignoring {} from peer", other.event_type()),
        }

        Ok(())
    }

    /// Stop every subsystem, wait for all tasks and close the outbound half
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        self.capture.stop().await;
        self.asr.abort().await;
        self.tts.stop().await;

        self.tracker.close();
        self.tracker.wait().await;

        if let Err(e) = self.writer.shutdown().await {
            debug!("Failed to shut down writer: {}", e);
        }
    }

    pub fn id(&self) -> Uuid {
        self.stats.id()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn summary(&self) -> SessionSummary {
        self.stats.summary(self.writer.frames_written())
    }

    pub async fn is_streaming(&self) -> bool {
        self.capture.is_active().await
    }

    pub async fn is_listening(&self) -> bool {
        self.asr.is_listening().await
    }

    pub async fn is_speaking(&self) -> bool {
        self.tts.is_speaking().await
    }

    /// Bytes currently buffered for recognition
    pub async fn buffered_audio(&self) -> usize {
        self.asr.buffered_bytes().await
    }
}
