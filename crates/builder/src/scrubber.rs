//! Removal of every copy of a request's configuration.
//!
//! The staged `userPrefs.jsonc` and the compiled images embed channel keys.
//! A [`ScrubPlan`] lists every location a build may have left them in; the
//! [`Scrubber`] removes each one independently and never fails.

use mtfw_core::variant::ARTIFACT_FILE_NAMES;
use std::io;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Locations to clean after a build.
#[derive(Clone, Debug, Default)]
pub struct ScrubPlan {
    /// Config copies staged into the build tree.
    pub staged_configs: Vec<PathBuf>,
    /// The request's own config document.
    pub request_config: Option<PathBuf>,
    /// Directories whose `firmware.*` images are removed (not the directory itself).
    pub artifact_dirs: Vec<PathBuf>,
    /// RAM-backed build directory, removed entirely.
    pub scratch_dir: Option<PathBuf>,
    /// Request directory, removed entirely on failed builds.
    pub request_dir: Option<PathBuf>,
}

impl ScrubPlan {
    /// Same plan, also removing the request directory.
    pub fn with_request_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request_dir = Some(dir.into());
        self
    }
}

/// What a scrub did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScrubReport {
    pub removed: usize,
    pub failed: usize,
}

impl ScrubReport {
    fn record(&mut self, path: &Path, result: io::Result<()>) {
        match result {
            Ok(()) => {
                self.removed += 1;
                tracing::debug!(path = %path.display(), "Scrubbed");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                self.failed += 1;
                tracing::error!(path = %path.display(), error = %e, "Failed to scrub sensitive file");
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Executes scrub plans.
#[derive(Clone, Copy, Debug, Default)]
pub struct Scrubber;

impl Scrubber {
    /// Run the plan on the blocking pool.
    #[instrument(skip(self, plan))]
    pub async fn scrub(&self, plan: &ScrubPlan) -> ScrubReport {
        let owned = plan.clone();
        match tokio::task::spawn_blocking(move || Scrubber::scrub_blocking(&owned)).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Scrub task failed, retrying inline");
                Scrubber::scrub_blocking(plan)
            }
        }
    }

    /// Run the plan on the current thread.
    pub fn scrub_blocking(plan: &ScrubPlan) -> ScrubReport {
        let mut report = ScrubReport::default();

        for path in plan.staged_configs.iter().chain(plan.request_config.iter()) {
            report.record(path, std::fs::remove_file(path));
        }
        for dir in &plan.artifact_dirs {
            for name in ARTIFACT_FILE_NAMES {
                let path = dir.join(name);
                report.record(&path, std::fs::remove_file(&path));
            }
        }
        for dir in plan.scratch_dir.iter().chain(plan.request_dir.iter()) {
            report.record(dir, std::fs::remove_dir_all(dir));
        }

        if report.failed > 0 {
            tracing::warn!(
                removed = report.removed,
                failed = report.failed,
                "Scrub finished with failures"
            );
        }
        report
    }
}

/// Runs a plan synchronously on drop unless disarmed.
///
/// Covers builds that unwind or whose future is dropped between staging and
/// the explicit scrub.
pub struct ScrubGuard {
    plan: Option<ScrubPlan>,
}

impl ScrubGuard {
    pub fn new(plan: ScrubPlan) -> Self {
        Self { plan: Some(plan) }
    }

    /// Take the plan back; drop will do nothing afterwards.
    pub fn disarm(mut self) -> ScrubPlan {
        self.plan.take().unwrap_or_default()
    }
}

impl Drop for ScrubGuard {
    fn drop(&mut self) {
        if let Some(plan) = self.plan.take() {
            tracing::warn!("Build ended before scrubbing, scrubbing from drop guard");
            Scrubber::scrub_blocking(&plan);
        }
    }
}
