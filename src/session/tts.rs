use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::task::BackgroundTask;
use crate::audio::AudioFormat;
use crate::protocol::{ControlEvent, FrameWriter};
use crate::tts::Synthesizer;

/// Speech synthesis playback: at most one utterance streams at a time
pub struct TtsSession {
    task: Mutex<Option<BackgroundTask>>,
    synthesizer: Arc<dyn Synthesizer>,
    format: AudioFormat,
    pacing: Duration,
    writer: Arc<FrameWriter>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl TtsSession {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        format: AudioFormat,
        pacing: Duration,
        writer: Arc<FrameWriter>,
        tracker: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task: Mutex::new(None),
            synthesizer,
            format,
            pacing,
            writer,
            tracker,
            cancel,
        }
    }

    /// Speak `text`, superseding any utterance still in flight
    pub async fn start(&self, text: String) {
        let mut task = self.task.lock().await;

        if let Some(previous) = task.take() {
            debug!("Superseding in-flight synthesis");
            previous.cancel_and_wait().await;
        }

        info!(
            "Synthesizing {} characters ({})",
            text.chars().count(),
            self.synthesizer.name()
        );

        let synthesizer = Arc::clone(&self.synthesizer);
        let writer = Arc::clone(&self.writer);
        let format = self.format;
        let pacing = self.pacing;

        *task = Some(BackgroundTask::spawn(&self.tracker, &self.cancel, move |token| {
            speak(synthesizer, text, format, pacing, writer, token)
        }));
    }

    /// Cancel the current utterance; no `tts.done` follows
    pub async fn stop(&self) {
        let previous = self.task.lock().await.take();

        match previous {
            Some(task) => {
                task.cancel_and_wait().await;
                info!("Synthesis stopped");
            }
            None => debug!("No synthesis in flight"),
        }
    }

    pub async fn is_speaking(&self) -> bool {
        let task = self.task.lock().await;
        task.as_ref().is_some_and(BackgroundTask::is_running)
    }
}

async fn speak(
    synthesizer: Arc<dyn Synthesizer>,
    text: String,
    format: AudioFormat,
    pacing: Duration,
    writer: Arc<FrameWriter>,
    cancel: CancellationToken,
) {
    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        stream = synthesizer.synthesize(&text, &format) => stream,
    };

    let mut chunks = match stream {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!("Synthesis failed: {:#}", e);
            send_error(&writer, format!("{:#}", e)).await;
            return;
        }
    };

    if let Err(e) = writer.send_event(&ControlEvent::TtsReady).await {
        warn!("{:#}", e);
        return;
    }

    let mut sent: usize = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = chunks.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                warn!("Synthesis stream failed after {} chunks: {:#}", sent, e);
                send_error(&writer, format!("{:#}", e)).await;
                return;
            }
            None => break,
        };

        if let Err(e) = writer.send_audio(chunk).await {
            warn!("Failed to write synthesized audio: {}", e);
            return;
        }
        sent += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(pacing) => {}
        }
    }

    debug!("Synthesis finished after {} chunks", sent);

    if cancel.is_cancelled() {
        return;
    }

    if let Err(e) = writer.send_event(&ControlEvent::TtsDone).await {
        warn!("{:#}", e);
    }
}

async fn send_error(writer: &FrameWriter, message: String) {
    if let Err(e) = writer.send_event(&ControlEvent::TtsError { message }).await {
        warn!("{:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{self, read_frame, FrameKind, DEFAULT_MAX_FRAME_BYTES};
    use crate::tts::AudioChunkStream;

    /// One chunk, then the utterance is stopped exactly as the stream ends
    struct StoppedAtEnd {
        token: CancellationToken,
    }

    #[async_trait::async_trait]
    impl Synthesizer for StoppedAtEnd {
        async fn synthesize(&self, _text: &str, _format: &AudioFormat) -> anyhow::Result<AudioChunkStream> {
            let token = self.token.clone();
            let chunks = futures::stream::unfold(false, move |sent| {
                let token = token.clone();
                async move {
                    if sent {
                        token.cancel();
                        None
                    } else {
                        Some((Ok(vec![0u8; 640]), true))
                    }
                }
            });
            Ok(chunks.boxed())
        }

        fn name(&self) -> &str {
            "stopped-at-end"
        }
    }

    #[tokio::test]
    async fn test_stop_at_end_of_stream_sends_no_done() {
        let (mut peer, server) = tokio::io::duplex(64 * 1024);
        let writer = Arc::new(FrameWriter::new(server));
        let token = CancellationToken::new();
        let synthesizer = Arc::new(StoppedAtEnd { token: token.clone() });

        speak(
            synthesizer,
            "hi".to_string(),
            AudioFormat::default(),
            Duration::from_millis(1),
            Arc::clone(&writer),
            token,
        )
        .await;
        writer.shutdown().await.unwrap();
        drop(writer);

        let mut frames = Vec::new();
        while let Some(frame) = read_frame(&mut peer, DEFAULT_MAX_FRAME_BYTES).await.unwrap() {
            frames.push(frame);
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(protocol::decode(&frames[0].payload).unwrap(), Some(ControlEvent::TtsReady));
        assert_eq!(frames[1].kind, FrameKind::Audio);
    }
}
