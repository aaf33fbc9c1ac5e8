use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::session::{Adapters, SessionConfig, SessionCoordinator, SessionSummary};

/// Run a single session over stdin/stdout
///
/// Stdout carries frames, so logging must stay on stderr.
pub async fn serve_stdio(
    config: Arc<SessionConfig>,
    adapters: Adapters,
    shutdown: CancellationToken,
) -> Result<SessionSummary> {
    info!("Serving one session over stdio");

    let session = SessionCoordinator::with_parent(config, adapters, tokio::io::stdout(), &shutdown);
    session.run(tokio::io::stdin()).await
}
