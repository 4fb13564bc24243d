//! Background retention: startup sweep, periodic sweeps and post-download
//! removal of request directories.

use crate::metrics;
use crate::state::{AppState, TaskKind};
use mtfw_builder::{RequestWorkspace, RetentionSweeper, SweepStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Run one sweep and record its metrics.
pub async fn run_sweep(sweeper: &RetentionSweeper) -> SweepStats {
    let stats = sweeper.sweep().await;
    metrics::record_sweep(&stats);
    stats
}

/// Sweep every `interval` until `shutdown` is cancelled.
pub fn spawn_periodic_sweep(
    sweeper: Arc<RetentionSweeper>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Periodic cleanup enabled");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Periodic cleanup stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    run_sweep(&sweeper).await;
                }
            }
        }
    })
}

/// Remove a served request directory once the grace delay has passed.
pub async fn schedule_request_cleanup(state: &AppState, workspace: RequestWorkspace) {
    let grace = state.config.retention.download_grace();
    state
        .tasks
        .spawn(TaskKind::DownloadCleanup, async move {
            tokio::time::sleep(grace).await;
            match workspace.remove().await {
                Ok(true) => tracing::info!(build_id = %workspace.id(), "Cleaned up build directory"),
                Ok(false) => {}
                Err(e) => {
                    metrics::CLEANUP_FAILURES.inc();
                    tracing::error!(
                        build_id = %workspace.id(),
                        error = %e,
                        "Failed to clean up build directory"
                    );
                }
            }
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtfw_builder::{BuildTree, BuildTreeLocks};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_periodic_sweep_stops_on_cancel() {
        let temp = tempdir().unwrap();
        let sweeper = Arc::new(RetentionSweeper::new(
            temp.path().join("requests"),
            BuildTree::new(temp.path().join("firmware"), &[]),
            Vec::new(),
            Duration::from_secs(3600),
            Arc::new(BuildTreeLocks::new()),
        ));
        let token = CancellationToken::new();
        let handle = spawn_periodic_sweep(sweeper, Duration::from_secs(3600), token.clone());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweep task should stop")
            .unwrap();
    }
}
