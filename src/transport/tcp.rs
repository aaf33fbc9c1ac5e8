use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::session::{Adapters, SessionConfig, SessionCoordinator};

/// Bind `addr` and serve sessions until `shutdown` is cancelled
pub async fn serve_tcp(
    addr: &str,
    config: Arc<SessionConfig>,
    adapters: Adapters,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    serve_listener(listener, config, adapters, shutdown).await
}

/// Accept connections on `listener`, one isolated session each
///
/// Cancelling `shutdown` stops accepting, tears down every live session and
/// returns once they have all finished.
pub async fn serve_listener(
    listener: TcpListener,
    config: Arc<SessionConfig>,
    adapters: Adapters,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        info!("Accepted connection from {}", peer);

        let (reader, writer) = stream.into_split();
        let session =
            SessionCoordinator::with_parent(Arc::clone(&config), adapters.clone(), writer, &shutdown);

        connections.spawn(
            async move {
                if let Err(e) = session.run(reader).await {
                    debug!("Connection ended with error: {:#}", e);
                }
            }
            .instrument(info_span!("connection", %peer)),
        );
    }

    info!("Shutting down, waiting for {} sessions", connections.len());
    connections.close();
    connections.wait().await;

    Ok(())
}
