//! Reclaims stale request directories and build-tree leftovers.

use crate::layout::{BuildTree, SCRATCH_PREFIX};
use crate::locks::BuildTreeLocks;
use crate::scrubber::{ScrubPlan, Scrubber};
use crate::workspace::remove_dir_if_present;
use mtfw_core::BuildId;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs;
use tracing::instrument;

/// Counters from one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// `build_*` directories present before the sweep.
    pub builds_before: usize,
    /// `build_*` directories left afterwards.
    pub builds_after: usize,
    pub builds_removed: usize,
    /// Staged configs and artifact images removed from the build tree.
    pub tree_files_removed: usize,
    pub scratch_dirs_removed: usize,
    pub errors: usize,
    /// False when a build held the tree and the rescan was skipped.
    pub tree_rescanned: bool,
}

/// Periodic and on-demand cleanup.
pub struct RetentionSweeper {
    temp_root: PathBuf,
    tree: BuildTree,
    scratch_roots: Vec<PathBuf>,
    max_age: Duration,
    locks: Arc<BuildTreeLocks>,
}

impl RetentionSweeper {
    pub fn new(
        temp_root: PathBuf,
        tree: BuildTree,
        scratch_roots: Vec<PathBuf>,
        max_age: Duration,
        locks: Arc<BuildTreeLocks>,
    ) -> Self {
        Self {
            temp_root,
            tree,
            scratch_roots,
            max_age,
            locks,
        }
    }

    pub async fn sweep(&self) -> SweepStats {
        self.sweep_at(OffsetDateTime::now_utc().unix_timestamp())
            .await
    }

    /// Sweep as if the current unix time were `now`.
    #[instrument(skip(self))]
    pub async fn sweep_at(&self, now: i64) -> SweepStats {
        let mut stats = SweepStats::default();
        self.sweep_requests(now, &mut stats).await;

        match self.locks.try_exclusive() {
            Some(_lease) => {
                self.rescan_tree(&mut stats).await;
                stats.tree_rescanned = true;
            }
            None => tracing::debug!("Build in flight, skipping build-tree rescan"),
        }

        tracing::info!(
            builds_before = stats.builds_before,
            builds_removed = stats.builds_removed,
            tree_files_removed = stats.tree_files_removed,
            scratch_dirs_removed = stats.scratch_dirs_removed,
            errors = stats.errors,
            "Retention sweep finished"
        );
        stats
    }

    /// Number of `build_*` directories under the temp root.
    pub async fn count_builds(&self) -> usize {
        let Ok(mut entries) = fs::read_dir(&self.temp_root).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if is_dir && entry.file_name().to_string_lossy().starts_with("build_") {
                count += 1;
            }
        }
        count
    }

    async fn sweep_requests(&self, now: i64, stats: &mut SweepStats) {
        let mut entries = match fs::read_dir(&self.temp_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list temp root");
                stats.errors += 1;
                return;
            }
        };

        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("build_") || !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            stats.builds_before += 1;

            let Some(created) = BuildId::created_secs_from_name(&name) else {
                tracing::debug!(dir = %name, "Unrecognised build directory name, keeping");
                continue;
            };
            if now.saturating_sub(created) <= max_age {
                continue;
            }

            match remove_dir_if_present(&entry.path()).await {
                Ok(_) => {
                    stats.builds_removed += 1;
                    tracing::info!(dir = %name, "Removed expired build directory");
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::error!(dir = %name, error = %e, "Failed to remove build directory");
                }
            }
        }
        stats.builds_after = stats.builds_before - stats.builds_removed;
    }

    /// Remove staged configs and artifact images left in the tree. Only
    /// called while holding the tree exclusively.
    async fn rescan_tree(&self, stats: &mut SweepStats) {
        let mut staged = Vec::new();
        for path in self.tree.staging_paths() {
            if fs::try_exists(&path).await.unwrap_or(false) {
                staged.push(path);
            }
        }
        let leftovers = self.tree.leftover_artifacts().await;
        if !staged.is_empty() || !leftovers.is_empty() {
            tracing::warn!(
                staged = staged.len(),
                artifacts = leftovers.len(),
                "Found sensitive leftovers in build tree"
            );
        }

        let artifact_dirs = leftovers
            .iter()
            .filter_map(|p| p.parent().map(PathBuf::from))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let report = Scrubber
            .scrub(&ScrubPlan {
                staged_configs: staged,
                artifact_dirs,
                ..Default::default()
            })
            .await;
        stats.tree_files_removed += report.removed;
        stats.errors += report.failed;

        for root in &self.scratch_roots {
            let Ok(mut entries) = fs::read_dir(root).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                if !entry.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX) {
                    continue;
                }
                match remove_dir_if_present(&entry.path()).await {
                    Ok(true) => stats.scratch_dirs_removed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        stats.errors += 1;
                        tracing::error!(
                            dir = %entry.path().display(),
                            error = %e,
                            "Failed to remove scratch directory"
                        );
                    }
                }
            }
        }
    }
}
