//! Byte-stream transports a session can run over
//!
//! - `tcp` - one session per accepted connection
//! - `stdio` - a single session over stdin/stdout

mod stdio;
mod tcp;

use anyhow::{Context, Result};
use tokio::io::AsyncRead;
use tokio::net::TcpStream;

use crate::config::Transport;
use crate::protocol::writer::BoxedWriter;

pub use stdio::serve_stdio;
pub use tcp::{serve_listener, serve_tcp};

/// Boxed inbound half of a connection
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Open a client connection over `transport`
pub async fn connect(transport: Transport, addr: &str) -> Result<(BoxedReader, BoxedWriter)> {
    match transport {
        Transport::Tcp => {
            let stream = TcpStream::connect(addr)
                .await
                .with_context(|| format!("Failed to connect to {}", addr))?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        Transport::Stdio => Ok((Box::new(tokio::io::stdin()), Box::new(tokio::io::stdout()))),
    }
}
