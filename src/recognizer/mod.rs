//! Speech recognizer collaborators
//!
//! A recognizer is batch oriented: it receives a self-contained block of mono
//! samples and returns plain text. The ASR session calls it repeatedly over a
//! sliding window for partials and once more on stop for the final result.

mod whisper;

use std::time::Duration;

use thiserror::Error;

pub use whisper::{extract_transcript, WhisperCli, WhisperConfig};

/// Transcript returned by the mock backend
pub const DEMO_TRANSCRIPT: &str = "demo transcript (replace with Whisper)";

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("recognizer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("recognizer exited with {status}: {output}")]
    Failed { status: String, output: String },

    #[error("recognizer timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to prepare recognizer input: {0}")]
    Input(String),
}

#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe mono samples recorded at `sample_rate`
    async fn transcribe(
        &self,
        samples: &[i16],
        sample_rate: u32,
        language: &str,
    ) -> Result<String, RecognizerError>;

    /// Rate the recognizer expects its input at
    fn sample_rate(&self) -> u32 {
        16000
    }

    /// Whether partial transcriptions should be attempted while listening
    fn live(&self) -> bool {
        true
    }

    fn name(&self) -> &str;
}

/// Recognizer that always answers with the same text
///
/// Backs the `mock` ASR backend: no partials, a fixed final result.
#[derive(Debug, Clone)]
pub struct StaticRecognizer {
    text: String,
}

impl StaticRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for StaticRecognizer {
    fn default() -> Self {
        Self::new(DEMO_TRANSCRIPT)
    }
}

#[async_trait::async_trait]
impl Recognizer for StaticRecognizer {
    async fn transcribe(
        &self,
        _samples: &[i16],
        _sample_rate: u32,
        _language: &str,
    ) -> Result<String, RecognizerError> {
        Ok(self.text.clone())
    }

    fn live(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "mock"
    }
}
