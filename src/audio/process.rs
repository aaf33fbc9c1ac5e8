// Subprocess-backed capture and playback
//
// The device itself is owned by an external program; we only move raw s16le
// PCM through its stdout (capture) or stdin (playback).

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use super::backend::{AudioFormat, CaptureAdapter, PlaybackAdapter, SAMPLE_FORMAT};

/// Capture adapter reading PCM from a child process
pub struct CommandCapture {
    name: String,
    child: Child,
    stdout: ChildStdout,
    frame_size: usize,
}

impl CommandCapture {
    /// `parec --raw` at the requested rate/channel layout
    pub fn parec(format: &AudioFormat) -> Result<Self> {
        let channels = format.channels.to_string();
        let rate = format.sample_rate.to_string();

        let mut command = Command::new("parec");
        command.args([
            "--raw",
            "--channels",
            channels.as_str(),
            "--rate",
            rate.as_str(),
            "--format",
            SAMPLE_FORMAT,
        ]);
        Self::spawn("parec", command, format)
    }

    /// Any shell command that writes raw PCM in `format` to stdout
    pub fn shell(command_line: &str, format: &AudioFormat) -> Result<Self> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line);
        Self::spawn(command_line, command, format)
    }

    fn spawn(name: &str, mut command: Command, format: &AudioFormat) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start capture process: {}", name))?;

        let stdout = child
            .stdout
            .take()
            .context("Capture process has no stdout pipe")?;

        debug!("Capture process started: {}", name);

        Ok(Self {
            name: name.to_string(),
            child,
            stdout,
            frame_size: format.bytes_per_frame(),
        })
    }
}

#[async_trait::async_trait]
impl CaptureAdapter for CommandCapture {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stdout
            .read(buf)
            .await
            .with_context(|| format!("Failed to read from {}", self.name))
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.child.start_kill() {
            // Already exited on its own
            debug!("Capture process {} not killed: {}", self.name, e);
        }
        let status = self
            .child
            .wait()
            .await
            .with_context(|| format!("Failed to reap capture process {}", self.name))?;
        debug!("Capture process {} exited: {}", self.name, status);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Playback adapter feeding PCM into a child process
pub struct CommandPlayback {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl CommandPlayback {
    pub fn shell(command_line: &str) -> Result<Self> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start playback process: {}", command_line))?;

        let stdin = child.stdin.take();

        Ok(Self {
            name: command_line.to_string(),
            child,
            stdin,
        })
    }
}

#[async_trait::async_trait]
impl PlaybackAdapter for CommandPlayback {
    async fn write(&mut self, pcm: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .context("Playback process already closed")?;
        stdin
            .write_all(pcm)
            .await
            .with_context(|| format!("Failed to write to {}", self.name))
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping stdin lets well-behaved players drain and exit
        drop(self.stdin.take());
        if let Err(e) = self.child.start_kill() {
            debug!("Playback process {} not killed: {}", self.name, e);
        }
        if let Err(e) = self.child.wait().await {
            warn!("Failed to reap playback process {}: {}", self.name, e);
        }
        Ok(())
    }
}
