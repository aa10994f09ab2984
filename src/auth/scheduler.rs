use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::auth::SessionManager;

/// Proactive silent-refresh loop.
///
/// Re-mints the access token on a fixed period while a session is active,
/// regardless of actual expiry. The task stops itself the moment a refresh
/// fails (the manager has logged out by then) and is cancelled explicitly
/// when its owner tears the session down.
pub struct RefreshTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn spawn(manager: Arc<SessionManager>, every: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the session was just
            // established, so skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !manager.refresh().await {
                            tracing::debug!("refresh loop stopping after failed refresh");
                            break;
                        }
                    }
                }
            }
        });
        Self { cancel, handle }
    }

    /// Cancels the loop and waits for it to wind down.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
