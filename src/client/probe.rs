use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::protocol::{self, read_frame, write_frame, ControlEvent, Frame, FrameKind};

/// How long to wait for the reply to `describe`
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Send `describe` and wait for exactly one reply frame
///
/// Returns `None` when the reply is a control event of a type this build
/// does not know.
pub async fn probe<R, W>(reader: &mut R, writer: &mut W, max_frame_bytes: usize) -> Result<Option<ControlEvent>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let describe = protocol::encode(&ControlEvent::Describe)?;
    write_frame(writer, &Frame::control(describe)).await?;
    writer.flush().await?;

    let reply = tokio::time::timeout(PROBE_TIMEOUT, read_frame(reader, max_frame_bytes))
        .await
        .context("Timed out waiting for a reply")?
        .context("Failed to read reply")?;

    let Some(frame) = reply else {
        bail!("Server closed the connection without replying");
    };

    if frame.kind != FrameKind::Control {
        bail!("Expected a control frame, got kind {:#04x}", frame.kind.as_byte());
    }

    Ok(protocol::decode(&frame.payload)?)
}
