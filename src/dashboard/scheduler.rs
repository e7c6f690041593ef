use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Dashboard;

/// Default period between background scan cycles.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic rescan task. The next sleep starts only after the previous cycle finished.
///
/// Cancellation interrupts the sleep only. A cycle already running is awaited,
/// so its git and gh children are never killed early.
pub struct BackgroundScanner {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundScanner {
    pub fn start(dashboard: Arc<Dashboard>, period: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }

                dashboard.run_cycle().await;
                if token.is_cancelled() {
                    break;
                }
            }
            tracing::debug!("Background scanner stopped");
        });

        Self { shutdown, handle }
    }

    /// Signal the task and wait for it to exit, including any cycle in progress.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await
            && !e.is_cancelled()
        {
            tracing::error!(error = %e, "Background scanner task failed");
        }
    }
}
