use mtfw_builder::{BuildService, BuildTree, BuildTreeLocks, Orchestrator, RetentionSweeper, Toolchain};
use mtfw_core::config::AppConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A throwaway firmware tree, temp root and scratch root.
#[allow(dead_code)]
pub struct TestTree {
    pub temp: TempDir,
    pub config: AppConfig,
    pub tree: BuildTree,
    pub locks: Arc<BuildTreeLocks>,
}

#[allow(dead_code)]
impl TestTree {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(modify: impl FnOnce(&mut AppConfig)) -> Self {
        let temp = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = AppConfig::for_testing(temp.path());
        modify(&mut config);

        std::fs::create_dir_all(&config.paths.firmware_dir).expect("Failed to create firmware dir");
        std::fs::create_dir_all(&config.paths.temp_root).expect("Failed to create temp root");
        for root in &config.build.scratch_roots {
            std::fs::create_dir_all(root).expect("Failed to create scratch root");
        }

        let tree = BuildTree::from_config(&config.paths.firmware_dir, &config.build);
        Self {
            temp,
            config,
            tree,
            locks: Arc::new(BuildTreeLocks::new()),
        }
    }

    /// Configure a RAM-style scratch root inside the temp dir.
    pub fn with_scratch() -> Self {
        Self::with_config(|config| {
            let root = config.paths.temp_root.parent().unwrap().join("shm");
            config.build.scratch_roots = vec![root];
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn temp_root(&self) -> PathBuf {
        self.config.paths.temp_root.clone()
    }

    pub fn orchestrator(&self, toolchain: Arc<dyn Toolchain>) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            self.tree.clone(),
            self.config.build.clone(),
            toolchain,
            self.locks.clone(),
        ))
    }

    pub fn service(&self, toolchain: Arc<dyn Toolchain>) -> BuildService {
        BuildService::new(self.temp_root(), self.orchestrator(toolchain))
    }

    pub fn sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(
            self.temp_root(),
            self.tree.clone(),
            self.config.build.scratch_roots.clone(),
            self.config.retention.max_age(),
            self.locks.clone(),
        )
    }

    /// True if no staged config copy exists in the tree.
    pub fn no_staged_configs(&self) -> bool {
        self.tree.staging_paths().iter().all(|p| !p.exists())
    }

    /// Number of `build_*` directories under the temp root.
    pub fn request_dirs(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.temp_root()) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with("build_"))
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
