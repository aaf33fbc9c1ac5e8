// whisper.cpp command-line recognizer
//
// Each call writes the samples to a scratch WAV file and runs
//   <cli> -m <model> -f <wav> --no-timestamps [-l <language>]
// taking the last non-diagnostic line of stdout as the transcript.

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use super::{Recognizer, RecognizerError};

#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the whisper-cli binary
    pub cli: PathBuf,
    /// Path to the ggml model file
    pub model: PathBuf,
    /// Upper bound on a single invocation
    pub timeout: Duration,
}

pub struct WhisperCli {
    config: WhisperConfig,
}

impl WhisperCli {
    pub fn new(config: WhisperConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Recognizer for WhisperCli {
    async fn transcribe(
        &self,
        samples: &[i16],
        sample_rate: u32,
        language: &str,
    ) -> Result<String, RecognizerError> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let wav = encode_wav(samples, sample_rate)
            .map_err(|e| RecognizerError::Input(e.to_string()))?;

        // Removed from disk when dropped at the end of this call
        let scratch = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let mut file = tempfile::Builder::new()
                .prefix("ion-whisper-")
                .suffix(".wav")
                .tempfile()?;
            file.write_all(&wav)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(|e| RecognizerError::Input(e.to_string()))??;

        let mut command = Command::new(&self.config.cli);
        command
            .arg("-m")
            .arg(&self.config.model)
            .arg("-f")
            .arg(scratch.path())
            .arg("--no-timestamps");
        let language = language.trim();
        if !language.is_empty() {
            command.arg("-l").arg(language);
        }
        command.stdin(Stdio::null()).kill_on_drop(true);

        debug!(
            "Running {} on {} samples ({}Hz)",
            self.config.cli.display(),
            samples.len(),
            sample_rate
        );

        let output = tokio::time::timeout(self.config.timeout, command.output())
            .await
            .map_err(|_| RecognizerError::Timeout(self.config.timeout))??;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(RecognizerError::Failed {
                status: output.status.to_string(),
                output: combined.trim().to_string(),
            });
        }

        Ok(extract_transcript(&String::from_utf8_lossy(&output.stdout)))
    }

    fn name(&self) -> &str {
        "whisper"
    }
}

/// Pick the transcript out of whisper-cli output
///
/// Scans from the end, skipping blank lines, the tool's own log lines and
/// timestamp-annotated segment lines.
pub fn extract_transcript(output: &str) -> String {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| {
            !line.is_empty()
                && !line.starts_with("whisper_")
                && !line.starts_with("main:")
                && !line.starts_with("system_info:")
                && !(line.starts_with('[') && line.contains("-->"))
        })
        .unwrap_or_default()
        .to_string()
}

/// Mono 16-bit PCM WAV container
fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
