// Satellite client
//
// A satellite is a thin audio endpoint: it announces itself, streams its
// microphone to the server and plays whatever audio the server sends back.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::audio::{AudioFormat, CaptureAdapter, CommandCapture, CommandPlayback, PlaybackAdapter, SAMPLE_FORMAT};
use crate::protocol::{self, read_frame, ControlEvent, FrameKind, FrameWriter};

/// Microphone read size (20ms of 16kHz mono)
pub const MIC_CHUNK_BYTES: usize = 640;

#[derive(Debug, Clone)]
pub struct SatelliteOptions {
    /// Name announced in `satellite.hello`
    pub name: String,

    /// Shell command writing raw PCM in the server's format to stdout
    pub mic_command: Option<String>,

    /// Shell command playing raw PCM from stdin
    pub snd_command: Option<String>,

    /// Send `asr.start` before streaming and `asr.stop` on shutdown
    pub auto_asr: bool,

    pub max_frame_bytes: usize,
}

impl Default for SatelliteOptions {
    fn default() -> Self {
        Self {
            name: "ion-satellite".to_string(),
            mic_command: None,
            snd_command: None,
            auto_asr: true,
            max_frame_bytes: protocol::DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Run the satellite until the server disconnects or `shutdown` is cancelled
pub async fn run_satellite<R, W>(
    mut reader: R,
    writer: W,
    options: SatelliteOptions,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let writer = Arc::new(FrameWriter::new(writer));

    writer.send_event(&ControlEvent::Describe).await?;

    let format = await_ready(&mut reader, options.max_frame_bytes).await?;
    info!(
        "Server ready ({}Hz, {} channels, {})",
        format.sample_rate, format.channels, SAMPLE_FORMAT
    );

    writer
        .send_event(&ControlEvent::SatelliteHello {
            name: options.name.clone(),
            sample_rate: format.sample_rate,
            channels: format.channels,
            format: SAMPLE_FORMAT.to_string(),
            wake: false,
            vad: false,
            asr: true,
            tts: true,
        })
        .await?;

    let mut sink: Option<Box<dyn PlaybackAdapter>> = match &options.snd_command {
        Some(command) => Some(Box::new(CommandPlayback::shell(command)?)),
        None => None,
    };

    let tasks = TaskTracker::new();
    let mic_cancel = shutdown.child_token();
    let mut listening = false;

    if let Some(command) = &options.mic_command {
        let mic = CommandCapture::shell(command, &format)?;

        if options.auto_asr {
            writer.send_event(&ControlEvent::AsrStart { language: None }).await?;
            listening = true;
        }

        tasks.spawn(stream_microphone(Box::new(mic), Arc::clone(&writer), mic_cancel.clone()));
    }

    let result = receive_loop(&mut reader, &mut sink, options.max_frame_bytes, &shutdown).await;

    if listening {
        if let Err(e) = writer.send_event(&ControlEvent::AsrStop).await {
            debug!("Failed to send asr.stop: {:#}", e);
        }
    }

    mic_cancel.cancel();
    tasks.close();
    tasks.wait().await;

    if let Some(sink) = sink.as_mut() {
        if let Err(e) = sink.close().await {
            warn!("Failed to close playback: {:#}", e);
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Failed to shut down writer: {}", e);
    }

    result
}

/// The first frame from the server must be `ready`
async fn await_ready<R>(reader: &mut R, max_frame_bytes: usize) -> Result<AudioFormat>
where
    R: AsyncRead + Unpin,
{
    let frame = read_frame(reader, max_frame_bytes)
        .await
        .context("Failed to read ready")?
        .context("Server closed the connection before ready")?;

    if frame.kind != FrameKind::Control {
        bail!("Expected ready, got a frame of kind {:#04x}", frame.kind.as_byte());
    }

    match protocol::decode(&frame.payload)? {
        Some(ControlEvent::Ready {
            protocol: server,
            sample_rate,
            channels,
            format,
        }) => {
            if format != SAMPLE_FORMAT {
                bail!("Unsupported sample format from {} server: {}", server, format);
            }
            Ok(AudioFormat::new(sample_rate, channels))
        }
        Some(other) => bail!("Expected ready, got {}", other.event_type()),
        None => bail!("Expected ready, got an unrecognized event"),
    }
}

async fn receive_loop<R>(
    reader: &mut R,
    sink: &mut Option<Box<dyn PlaybackAdapter>>,
    max_frame_bytes: usize,
    shutdown: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            frame = read_frame(reader, max_frame_bytes) => frame.context("Failed to read frame")?,
        };

        let Some(frame) = frame else {
            info!("Server closed the connection");
            return Ok(());
        };

        match frame.kind {
            FrameKind::Control => match protocol::decode(&frame.payload) {
                Ok(Some(ControlEvent::AsrPartial { text })) => info!("Partial: {}", text),
                Ok(Some(ControlEvent::AsrResult { text })) => info!("Transcript: {}", text),
                Ok(Some(ControlEvent::AsrError { message })) => warn!("ASR error: {}", message),
                Ok(Some(ControlEvent::TtsError { message })) => warn!("TTS error: {}", message),
                Ok(Some(event)) => info!("Received {}", event.event_type()),
                Ok(None) => debug!("Ignoring unrecognized event"),
                Err(e) => warn!("Failed to decode control event: {}", e),
            },
            FrameKind::Audio => {
                if let Some(player) = sink.as_mut() {
                    // A dead player only silences playback; the session goes on
                    if let Err(e) = player.write(&frame.payload).await {
                        warn!("Playback failed, discarding further audio: {:#}", e);
                        if let Err(e) = player.close().await {
                            debug!("Failed to close playback: {:#}", e);
                        }
                        *sink = None;
                    }
                }
            }
            FrameKind::Other(kind) => debug!("Ignoring frame of unknown kind {:#04x}", kind),
        }
    }
}

async fn stream_microphone(mut mic: Box<dyn CaptureAdapter>, writer: Arc<FrameWriter>, cancel: CancellationToken) {
    let mut buf = vec![0u8; MIC_CHUNK_BYTES];

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = mic.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                info!("Microphone stream ended");
                break;
            }
            Ok(n) => {
                if let Err(e) = writer.send_audio(buf[..n].to_vec()).await {
                    warn!("Failed to send microphone audio: {}", e);
                    break;
                }
            }
            Err(e) => {
                warn!("Microphone read failed: {:#}", e);
                break;
            }
        }
    }

    if let Err(e) = mic.close().await {
        warn!("Failed to close microphone: {:#}", e);
    }
}
