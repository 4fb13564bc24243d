//! Application state shared across handlers.

use mtfw_builder::{
    BuildResult, BuildService, BuildTree, BuildTreeLocks, GithubReleaseUpdater, Orchestrator,
    PlatformIo, RetentionSweeper, SourceUpdater, Toolchain,
};
use mtfw_core::config::AppConfig;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Kinds of detached background work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Removal of a request directory after its artifact was served.
    DownloadCleanup,
    /// Firmware source update.
    SourceUpdate,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DownloadCleanup => "download_cleanup",
            Self::SourceUpdate => "source_update",
        }
    }
}

/// Tracks detached tasks so panics are logged instead of lost, and so at
/// most one source update runs at a time.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<Uuid, (TaskKind, JoinHandle<()>)>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn and track a task.
    pub async fn spawn<F>(&self, kind: TaskKind, future: F) -> Uuid
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let handle = tokio::spawn(future);
        self.tasks.lock().await.insert(id, (kind, handle));
        id
    }

    /// Spawn unless a live task of the same kind exists. Returns `None` when
    /// one is already running.
    pub async fn spawn_exclusive<F>(&self, kind: TaskKind, future: F) -> Option<Uuid>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        if tasks
            .values()
            .any(|(k, handle)| *k == kind && !handle.is_finished())
        {
            return None;
        }
        let id = Uuid::new_v4();
        tasks.insert(id, (kind, tokio::spawn(future)));
        Some(id)
    }

    /// Whether a task of `kind` is still running.
    pub async fn is_running(&self, kind: TaskKind) -> bool {
        self.tasks
            .lock()
            .await
            .values()
            .any(|(k, handle)| *k == kind && !handle.is_finished())
    }

    /// Spawn a watchdog that reaps finished tasks every `period`.
    pub fn spawn_watchdog(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                self.check_tasks().await;
            }
        })
    }

    /// Reap finished tasks and log the ones that panicked.
    pub async fn check_tasks(&self) {
        let finished: Vec<_> = {
            let mut tasks = self.tasks.lock().await;
            let ids: Vec<Uuid> = tasks
                .iter()
                .filter(|(_, (_, handle))| handle.is_finished())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| tasks.remove(&id).map(|task| (id, task)))
                .collect()
        };

        for (id, (kind, handle)) in finished {
            match handle.await {
                Ok(()) => tracing::debug!(task_id = %id, kind = kind.as_str(), "Task finished"),
                Err(e) if e.is_panic() => {
                    crate::metrics::CLEANUP_FAILURES.inc();
                    tracing::error!(task_id = %id, kind = kind.as_str(), panic = ?e, "Background task panicked");
                }
                Err(e) => {
                    tracing::warn!(task_id = %id, kind = kind.as_str(), error = %e, "Background task cancelled")
                }
            }
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Build entry points.
    pub builds: BuildService,
    /// Request-directory and build-tree cleanup.
    pub sweeper: Arc<RetentionSweeper>,
    /// Firmware source updater.
    pub updater: Arc<dyn SourceUpdater>,
    /// Detached background tasks.
    pub tasks: Arc<TaskRegistry>,
}

impl AppState {
    /// Wire up the PlatformIO toolchain and the GitHub release updater.
    pub fn new(config: AppConfig) -> BuildResult<Self> {
        let toolchain: Arc<dyn Toolchain> = Arc::new(PlatformIo::new(&config.build.pio_command));
        let locks = Arc::new(BuildTreeLocks::new());
        let tree = BuildTree::from_config(&config.paths.firmware_dir, &config.build);
        let updater = GithubReleaseUpdater::new(
            config.update.clone(),
            tree,
            config.paths.version_file.clone(),
            toolchain.clone(),
            locks.clone(),
        )?;
        Ok(Self::with_components(
            config,
            toolchain,
            Arc::new(updater),
            locks,
        ))
    }

    /// Assemble state from explicit collaborators. `locks` must be the same
    /// instance the updater was built with.
    pub fn with_components(
        config: AppConfig,
        toolchain: Arc<dyn Toolchain>,
        updater: Arc<dyn SourceUpdater>,
        locks: Arc<BuildTreeLocks>,
    ) -> Self {
        if config.admin.uses_default_password() {
            tracing::warn!("Admin endpoints use the default password; set admin.password_hash");
        }

        let tree = BuildTree::from_config(&config.paths.firmware_dir, &config.build);
        let orchestrator = Arc::new(Orchestrator::new(
            tree.clone(),
            config.build.clone(),
            toolchain,
            locks.clone(),
        ));
        let builds = BuildService::new(config.paths.temp_root.clone(), orchestrator);
        let sweeper = Arc::new(RetentionSweeper::new(
            config.paths.temp_root.clone(),
            tree,
            config.build.scratch_roots.clone(),
            config.retention.max_age(),
            locks,
        ));

        Self {
            config: Arc::new(config),
            builds,
            sweeper,
            updater,
            tasks: Arc::new(TaskRegistry::new()),
        }
    }
}
