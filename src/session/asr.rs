// Incremental speech-to-text staging
//
// While listening, inbound audio frames accumulate in a bounded window. A
// timer-driven loop periodically runs the recognizer over the window and
// emits deduplicated `asr.partial` events; `asr.stop` runs one final pass over
// the whole window and emits `asr.result`.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn, Instrument};

use super::config::AsrSettings;
use super::task::BackgroundTask;
use crate::audio::{pcm, AudioFormat, PcmWindow};
use crate::protocol::{ControlEvent, FrameWriter};
use crate::recognizer::{Recognizer, RecognizerError};

/// Acknowledgment partial sent as soon as listening begins
pub const LISTENING_ACK: &str = "listening...";

pub struct AsrSession {
    shared: Arc<AsrShared>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

struct AsrShared {
    state: Mutex<AsrState>,
    format: AudioFormat,
    settings: AsrSettings,
    recognizer: Arc<dyn Recognizer>,
    writer: Arc<FrameWriter>,
}

struct AsrState {
    listening: bool,
    window: PcmWindow,
    language: String,
    last_partial: String,
    in_flight: bool,
    partial_task: Option<BackgroundTask>,
}

impl AsrSession {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        format: AudioFormat,
        settings: AsrSettings,
        writer: Arc<FrameWriter>,
        tracker: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        let window = PcmWindow::with_frame_size(format.bytes_for_ms(settings.window_ms), format.bytes_per_frame());

        Self {
            shared: Arc::new(AsrShared {
                state: Mutex::new(AsrState {
                    listening: false,
                    window,
                    language: String::new(),
                    last_partial: String::new(),
                    in_flight: false,
                    partial_task: None,
                }),
                format,
                settings,
                recognizer,
                writer,
            }),
            tracker,
            cancel,
        }
    }

    /// Begin (or restart) listening
    ///
    /// Any running partial loop is cancelled and awaited before the window is
    /// reset, so a stale recognizer result can never land in fresh state.
    pub async fn start(&self, language: Option<String>) -> Result<()> {
        let previous = self.shared.state.lock().await.partial_task.take();
        if let Some(task) = previous {
            task.cancel_and_wait().await;
        }

        let language = language
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| self.shared.settings.default_language.clone());

        {
            let mut state = self.shared.state.lock().await;
            state.listening = true;
            state.window.clear();
            state.last_partial.clear();
            state.in_flight = false;
            state.language = language;
            info!(
                "ASR listening (language: {}, recognizer: {})",
                if state.language.is_empty() { "auto" } else { state.language.as_str() },
                self.shared.recognizer.name()
            );
        }

        self.shared
            .writer
            .send_event(&ControlEvent::AsrPartial {
                text: LISTENING_ACK.to_string(),
            })
            .await?;

        if self.shared.recognizer.live() {
            let mut state = self.shared.state.lock().await;
            if state.listening && state.partial_task.is_none() {
                let shared = Arc::clone(&self.shared);
                state.partial_task = Some(BackgroundTask::spawn(&self.tracker, &self.cancel, move |token| {
                    partial_loop(shared, token)
                }));
            }
        }

        Ok(())
    }

    /// Stop listening and transcribe the buffered window in the background
    ///
    /// Runs even when not listening: the final pass then covers whatever the
    /// window still holds, which may be nothing.
    pub async fn stop(&self) {
        let (task, pcm, language) = {
            let mut state = self.shared.state.lock().await;
            state.listening = false;
            (state.partial_task.take(), state.window.snapshot(), state.language.clone())
        };

        if let Some(task) = task {
            task.cancel_and_wait().await;
        }

        info!("ASR stopped, transcribing {} buffered bytes", pcm.len());

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.child_token();
        self.tracker.spawn(
            async move { final_transcription(shared, pcm, language, cancel).await }.in_current_span(),
        );
    }

    /// Stop listening without producing a final result (connection teardown)
    pub async fn abort(&self) {
        let task = {
            let mut state = self.shared.state.lock().await;
            state.listening = false;
            state.partial_task.take()
        };
        if let Some(task) = task {
            task.cancel_and_wait().await;
        }
    }

    /// Append inbound PCM to the window while listening
    pub async fn ingest(&self, pcm: &[u8]) {
        let mut state = self.shared.state.lock().await;
        if state.listening {
            state.window.push(pcm);
        }
    }

    pub async fn is_listening(&self) -> bool {
        self.shared.state.lock().await.listening
    }

    pub async fn buffered_bytes(&self) -> usize {
        self.shared.state.lock().await.window.len()
    }
}

impl AsrShared {
    async fn recognize(&self, pcm: &[u8], language: &str) -> Result<String, RecognizerError> {
        let rate = self.recognizer.sample_rate();
        let samples = pcm::prepare_for_recognizer(pcm, &self.format, rate);
        let text = self.recognizer.transcribe(&samples, rate, language).await?;
        Ok(text.trim().to_string())
    }
}

async fn partial_loop(shared: Arc<AsrShared>, cancel: CancellationToken) {
    let period = shared.settings.partial_interval;
    let min_bytes = shared.format.bytes_for_ms(shared.settings.min_audio_ms);

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let (pcm, language) = {
            let mut state = shared.state.lock().await;
            if cancel.is_cancelled() {
                break;
            }
            if !state.listening || state.in_flight || state.window.len() < min_bytes {
                continue;
            }
            state.in_flight = true;
            (state.window.snapshot(), state.language.clone())
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = shared.recognize(&pcm, &language) => result,
        };

        let event = {
            let mut state = shared.state.lock().await;
            if cancel.is_cancelled() {
                break;
            }
            state.in_flight = false;

            match result {
                Ok(text) => {
                    if !state.listening || text.is_empty() || text == state.last_partial {
                        continue;
                    }
                    state.last_partial = text.clone();
                    ControlEvent::AsrPartial { text }
                }
                Err(e) => {
                    warn!("Partial transcription failed: {}", e);
                    ControlEvent::AsrError {
                        message: e.to_string(),
                    }
                }
            }
        };

        if let Err(e) = shared.writer.send_event(&event).await {
            warn!("Failed to send partial transcription: {:#}", e);
            break;
        }
    }

    debug!("Partial transcription loop stopped");
}

async fn final_transcription(
    shared: Arc<AsrShared>,
    pcm: Vec<u8>,
    language: String,
    cancel: CancellationToken,
) {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = shared.recognize(&pcm, &language) => result,
    };

    let event = match result {
        Ok(text) if text.is_empty() => {
            debug!("Final transcript empty, nothing to send");
            return;
        }
        Ok(text) => {
            info!("Final transcript: {}", text);
            ControlEvent::AsrResult { text }
        }
        Err(e) => {
            warn!("Final transcription failed: {}", e);
            ControlEvent::AsrError {
                message: e.to_string(),
            }
        }
    };

    if let Err(e) = shared.writer.send_event(&event).await {
        warn!("Failed to send final transcription: {:#}", e);
    }
}
