use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, Instrument};

/// A spawned subsystem loop together with its own cancellation token
pub struct BackgroundTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn `body` on `tracker` with a child token of `parent`
    pub fn spawn<F, Fut>(tracker: &TaskTracker, parent: &CancellationToken, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let handle = tracker.spawn(body(token.clone()).in_current_span());
        Self { token, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel and wait until the task has fully exited
    pub async fn cancel_and_wait(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!("Background task panicked: {}", e);
            }
        }
    }
}
