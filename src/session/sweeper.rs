//! Background inactivity sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::manager::SessionManager;

/// Handle to a running inactivity sweeper. Dropping it leaves the task running until the
/// manager goes away; call [`shutdown`](Self::shutdown) to stop it.
#[derive(Debug)]
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit. A sweep in progress finishes first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl SessionManager {
    /// Run [`sweep_inactive`](Self::sweep_inactive) every `period`.
    ///
    /// The task holds only a weak reference and exits on its own once every clone of the
    /// manager is dropped.
    pub fn spawn_inactivity_sweeper(&self, period: Duration) -> SweeperHandle {
        let cancel = CancellationToken::new();
        let manager = Arc::downgrade(&self.inner);
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let Some(inner) = manager.upgrade() else {
                    break;
                };
                let report = SessionManager { inner }.sweep_inactive().await;
                if !report.is_empty() {
                    tracing::info!(
                        disposed = report.disposed.len(),
                        failed = report.failed.len(),
                        "Inactivity sweep removed sessions"
                    );
                }
            }
            tracing::debug!("Inactivity sweeper stopped");
        });

        SweeperHandle { cancel, task }
    }
}
