// Length-delimited binary frames
//
// Wire layout (6-byte header, no checksum, no padding):
//   [version: u8] [kind: u8] [length: u32 LE] [payload: length bytes]

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version carried in every frame header
pub const VERSION: u8 = 0x01;

/// Size of the fixed frame header in bytes
pub const HEADER_LEN: usize = 6;

/// Default upper bound on a single frame payload (16 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Frame payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// JSON control event
    Control,
    /// Raw s16le PCM
    Audio,
    /// Unrecognized kind byte (decoded to keep the stream aligned, then ignored)
    Other(u8),
}

impl FrameKind {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => FrameKind::Control,
            0x02 => FrameKind::Audio,
            other => FrameKind::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            FrameKind::Control => 0x01,
            FrameKind::Audio => 0x02,
            FrameKind::Other(byte) => byte,
        }
    }
}

/// One unit of the binary transport
///
/// The wire `length` field is always derived from the payload, so a frame can
/// never disagree with its own header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: Vec<u8>) -> Self {
        Self {
            version: VERSION,
            kind,
            payload,
        }
    }

    pub fn control(payload: Vec<u8>) -> Self {
        Self::new(FrameKind::Control, payload)
    }

    pub fn audio(payload: Vec<u8>) -> Self {
        Self::new(FrameKind::Audio, payload)
    }

    /// Payload length as carried in the header
    pub fn length(&self) -> usize {
        self.payload.len()
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("stream closed inside frame header ({received} of 6 bytes)")]
    TruncatedHeader { received: usize },

    #[error("stream closed inside frame payload ({received} of {expected} bytes)")]
    TruncatedPayload { expected: usize, received: usize },

    #[error("unsupported frame version {0:#04x}")]
    Version(u8),

    #[error("frame payload of {length} bytes exceeds limit of {limit} bytes")]
    Oversized { length: usize, limit: usize },

    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write one frame: header followed by exactly `length` payload bytes.
///
/// Nothing is flushed; callers own buffering and flushing.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let length = u32::try_from(frame.payload.len()).map_err(|_| FrameError::Oversized {
        length: frame.payload.len(),
        limit: u32::MAX as usize,
    })?;

    let mut header = [0u8; HEADER_LEN];
    header[0] = frame.version;
    header[1] = frame.kind.as_byte();
    header[2..6].copy_from_slice(&length.to_le_bytes());

    writer.write_all(&header).await?;
    writer.write_all(&frame.payload).await?;

    Ok(())
}

/// Read one complete frame.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
/// A stream that ends anywhere inside a frame is reported as truncation;
/// a short payload is never returned.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    let received = read_full(reader, &mut header).await?;
    if received == 0 {
        return Ok(None);
    }
    if received < HEADER_LEN {
        return Err(FrameError::TruncatedHeader { received });
    }

    if header[0] != VERSION {
        return Err(FrameError::Version(header[0]));
    }

    let kind = FrameKind::from_byte(header[1]);
    let length = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
    if length > max_len {
        return Err(FrameError::Oversized {
            length,
            limit: max_len,
        });
    }

    let mut payload = vec![0u8; length];
    let received = read_full(reader, &mut payload).await?;
    if received < length {
        return Err(FrameError::TruncatedPayload {
            expected: length,
            received,
        });
    }

    Ok(Some(Frame {
        version: header[0],
        kind,
        payload,
    }))
}

/// Fill `buf` until it is full or the stream ends; returns bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_kind_bytes() {
        assert_eq!(FrameKind::from_byte(1), FrameKind::Control);
        assert_eq!(FrameKind::from_byte(2), FrameKind::Audio);
        assert_eq!(FrameKind::from_byte(9), FrameKind::Other(9));
        assert_eq!(FrameKind::Other(9).as_byte(), 9);
        assert_eq!(FrameKind::Audio.as_byte(), 2);
    }

    #[tokio::test]
    async fn test_header_layout() {
        let frame = Frame::control(br#"{"type":"test"}"#.to_vec());
        let mut wire = Vec::new();
        write_frame(&mut wire, &frame).await.unwrap();

        assert_eq!(wire.len(), HEADER_LEN + 15);
        assert_eq!(wire[0], VERSION);
        assert_eq!(wire[1], 0x01);
        assert_eq!(&wire[2..6], &15u32.to_le_bytes());
        assert_eq!(&wire[6..], frame.payload.as_slice());
    }

    #[tokio::test]
    async fn test_empty_stream_is_clean_eof() {
        let mut empty: &[u8] = &[];
        let frame = read_frame(&mut empty, DEFAULT_MAX_FRAME_BYTES).await.unwrap();
        assert!(frame.is_none());
    }
}
