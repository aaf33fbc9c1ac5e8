use std::time::Duration;

use anyhow::Result;
use tokio::time::{sleep_until, Instant};

use super::backend::{AudioFormat, CaptureAdapter};

/// Capture adapter producing digital silence at real-time pace
///
/// Useful for exercising the streaming path on machines without an input
/// device.
pub struct SilentCapture {
    format: AudioFormat,
    next_deadline: Instant,
}

impl SilentCapture {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            next_deadline: Instant::now(),
        }
    }
}

#[async_trait::async_trait]
impl CaptureAdapter for SilentCapture {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let frame_size = self.format.bytes_per_frame().max(1);
        let len = buf.len() - buf.len() % frame_size;
        if len == 0 {
            return Ok(0);
        }

        let frames = (len / frame_size) as u64;
        let micros = frames * 1_000_000 / self.format.sample_rate.max(1) as u64;
        // No catch-up burst after the reader stalls
        self.next_deadline = self.next_deadline.max(Instant::now()) + Duration::from_micros(micros);
        sleep_until(self.next_deadline).await;

        buf[..len].fill(0);
        Ok(len)
    }

    fn frame_size(&self) -> usize {
        self.format.bytes_per_frame()
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "silence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_are_frame_aligned_zeroes() {
        let mut capture = SilentCapture::new(AudioFormat::new(16000, 2));
        let mut buf = [0xAAu8; 15];

        let n = capture.read(&mut buf).await.unwrap();

        assert_eq!(n, 12);
        assert!(buf[..n].iter().all(|&b| b == 0));
        assert_eq!(buf[12], 0xAA);
    }
}
