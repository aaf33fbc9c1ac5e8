// Shared harness for session-level tests
//
// A session runs over an in-memory duplex pipe; the test plays the peer and
// drives it with real frames. Collaborators are in-process stubs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ion::audio::{AudioFormat, CaptureAdapter, CaptureFactory, SilentCapture};
use ion::protocol::{self, read_frame, write_frame, ControlEvent, Frame, FrameKind};
use ion::recognizer::{Recognizer, RecognizerError, StaticRecognizer};
use ion::session::{Adapters, SessionConfig, SessionCoordinator, SessionSummary};
use ion::tts::ToneSynthesizer;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

pub const FRAME_TIMEOUT: Duration = Duration::from_secs(3);

/// Capture factory that counts opens and closes
///
/// With `chunks` set, each adapter delivers that many reads and then ends,
/// either at end of stream or with a read error.
#[derive(Default)]
pub struct CountingCapture {
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub fail: bool,
    pub chunks: Option<usize>,
    pub read_error: bool,
}

#[async_trait::async_trait]
impl CaptureFactory for CountingCapture {
    async fn open(&self, format: &AudioFormat) -> Result<Box<dyn CaptureAdapter>> {
        if self.fail {
            bail!("no capture device");
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedAdapter {
            inner: SilentCapture::new(*format),
            closed: Arc::clone(&self.closed),
            remaining: self.chunks,
            read_error: self.read_error,
        }))
    }
}

struct CountedAdapter {
    inner: SilentCapture,
    closed: Arc<AtomicUsize>,
    remaining: Option<usize>,
    read_error: bool,
}

#[async_trait::async_trait]
impl CaptureAdapter for CountedAdapter {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.remaining.as_mut() {
            Some(0) if self.read_error => bail!("capture device unplugged"),
            Some(0) => Ok(0),
            Some(left) => {
                *left -= 1;
                self.inner.read(buf).await
            }
            None => self.inner.read(buf).await,
        }
    }

    fn frame_size(&self) -> usize {
        self.inner.frame_size()
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "counted"
    }
}

/// Live recognizer answering from a script; the last answer repeats
pub struct ScriptedRecognizer {
    script: Mutex<Vec<String>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedRecognizer {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            script: Mutex::new(answers.iter().rev().map(|a| a.to_string()).collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn transcribe(&self, _samples: &[i16], _rate: u32, _language: &str) -> Result<String, RecognizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.pop().unwrap())
        } else {
            Ok(script.last().cloned().unwrap_or_default())
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Live recognizer that never finishes; records when a call is dropped
#[derive(Default)]
pub struct StallingRecognizer {
    pub calls: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Recognizer for StallingRecognizer {
    async fn transcribe(&self, _samples: &[i16], _rate: u32, _language: &str) -> Result<String, RecognizerError> {
        let _flag = DropFlag(Arc::clone(&self.dropped));
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("too late".to_string())
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

/// Live recognizer that always fails
pub struct FailingRecognizer;

#[async_trait::async_trait]
impl Recognizer for FailingRecognizer {
    async fn transcribe(&self, _samples: &[i16], _rate: u32, _language: &str) -> Result<String, RecognizerError> {
        Err(RecognizerError::Failed {
            status: "exit status: 1".to_string(),
            output: "model not loaded".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Session settings tuned for fast tests
pub fn fast_config() -> SessionConfig {
    let mut config = SessionConfig {
        chunk_ms: 5,
        ..SessionConfig::default()
    };
    config.asr.partial_interval = Duration::from_millis(40);
    config.asr.min_audio_ms = 10;
    config
}

pub fn adapters(capture: CountingCapture, recognizer: Arc<dyn Recognizer>) -> Adapters {
    Adapters {
        capture: Arc::new(capture),
        recognizer,
        synthesizer: Arc::new(ToneSynthesizer::default()),
    }
}

pub fn mock_adapters() -> Adapters {
    adapters(CountingCapture::default(), Arc::new(StaticRecognizer::default()))
}

/// Test-side peer of a running session
pub struct Peer {
    pub session: Arc<SessionCoordinator>,
    pub reader: ReadHalf<DuplexStream>,
    pub writer: WriteHalf<DuplexStream>,
    pub run: JoinHandle<Result<SessionSummary>>,
}

impl Peer {
    pub fn start(config: SessionConfig, adapters: Adapters) -> Self {
        let (client, server) = tokio::io::duplex(256 * 1024);
        let (server_reader, server_writer) = tokio::io::split(server);
        let (reader, writer) = tokio::io::split(client);

        let session = Arc::new(SessionCoordinator::new(Arc::new(config), adapters, server_writer));
        let runner = Arc::clone(&session);
        let run = tokio::spawn(async move { runner.run(server_reader).await });

        Self {
            session,
            reader,
            writer,
            run,
        }
    }

    pub async fn send(&mut self, event: ControlEvent) -> Result<()> {
        let payload = protocol::encode(&event)?;
        self.send_frame(Frame::control(payload)).await
    }

    pub async fn send_raw(&mut self, json: &str) -> Result<()> {
        self.send_frame(Frame::control(json.as_bytes().to_vec())).await
    }

    pub async fn send_audio(&mut self, pcm: Vec<u8>) -> Result<()> {
        self.send_frame(Frame::audio(pcm)).await
    }

    pub async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        write_frame(&mut self.writer, &frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next frame of any kind; `None` once the session closed the stream
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, read_frame(&mut self.reader, usize::MAX))
            .await
            .context("Timed out waiting for a frame")??;
        Ok(frame)
    }

    /// Next frame within `wait`, or `None` if nothing arrived
    pub async fn frame_within(&mut self, wait: Duration) -> Result<Option<Frame>> {
        match tokio::time::timeout(wait, read_frame(&mut self.reader, usize::MAX)).await {
            Ok(frame) => Ok(frame?),
            Err(_) => Ok(None),
        }
    }

    /// Next control event, counting audio frames skipped on the way
    pub async fn next_event(&mut self) -> Result<(ControlEvent, usize)> {
        let mut audio = 0;
        loop {
            let frame = self.next_frame().await?.context("Session closed the stream")?;
            match frame.kind {
                FrameKind::Control => {
                    let event = protocol::decode(&frame.payload)?.context("Unrecognized event")?;
                    return Ok((event, audio));
                }
                _ => audio += 1,
            }
        }
    }

    /// Send `describe` and collect every event up to the matching `ready`
    ///
    /// Events are handled in order, so everything the session produced for
    /// earlier requests has been written by then.
    pub async fn sync(&mut self) -> Result<(Vec<ControlEvent>, usize)> {
        self.send(ControlEvent::Describe).await?;
        let mut events = Vec::new();
        let mut audio = 0;
        loop {
            let (event, skipped) = self.next_event().await?;
            audio += skipped;
            if matches!(event, ControlEvent::Ready { .. }) {
                return Ok((events, audio));
            }
            events.push(event);
        }
    }

    /// Close our write half and wait for the session to finish
    pub async fn finish(mut self) -> Result<SessionSummary> {
        self.writer.shutdown().await?;
        tokio::time::timeout(FRAME_TIMEOUT, self.run)
            .await
            .context("Session did not finish")??
    }
}

pub fn speech(ms: u64) -> Vec<u8> {
    let format = AudioFormat::default();
    (0..format.frames_for_ms(ms))
        .flat_map(|i| (((i % 64) as i16 - 32) * 200).to_le_bytes())
        .collect()
}

pub fn listening_ack() -> ControlEvent {
    ControlEvent::AsrPartial {
        text: ion::session::LISTENING_ACK.to_string(),
    }
}
