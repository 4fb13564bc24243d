//! Server test utilities.

use super::fakes::{FakeToolchain, FakeUpdater};
use mtfw_builder::BuildTreeLocks;
use mtfw_core::config::AppConfig;
use mtfw_server::{AppState, create_router};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub toolchain: Arc<FakeToolchain>,
    pub updater: Arc<FakeUpdater>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Server whose builds produce an ESP32 image pair.
    pub fn new() -> Self {
        Self::build(
            FakeToolchain::producing(&["firmware.bin", "firmware.factory.bin"]),
            FakeUpdater::default(),
            |_| {},
        )
    }

    pub fn with_toolchain(toolchain: FakeToolchain) -> Self {
        Self::build(toolchain, FakeUpdater::default(), |_| {})
    }

    pub fn with_updater(updater: FakeUpdater) -> Self {
        Self::build(FakeToolchain::producing(&["firmware.bin"]), updater, |_| {})
    }

    /// Create a test server with custom config modifications.
    pub fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(
            FakeToolchain::producing(&["firmware.bin", "firmware.factory.bin"]),
            FakeUpdater::default(),
            modifier,
        )
    }

    fn build<F>(toolchain: FakeToolchain, updater: FakeUpdater, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = AppConfig::for_testing(temp_dir.path());
        config.retention.download_grace_secs = 0;
        modifier(&mut config);

        std::fs::create_dir_all(&config.paths.temp_root).expect("Failed to create temp root");
        std::fs::create_dir_all(&config.paths.firmware_dir)
            .expect("Failed to create firmware dir");

        let toolchain = Arc::new(toolchain);
        let updater = Arc::new(updater);
        let state = AppState::with_components(
            config,
            toolchain.clone(),
            updater.clone(),
            Arc::new(BuildTreeLocks::new()),
        );
        let router = create_router(state.clone());

        Self {
            router,
            state,
            toolchain,
            updater,
            _temp_dir: temp_dir,
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.state.config.paths.temp_root.clone()
    }

    pub fn firmware_dir(&self) -> PathBuf {
        self.state.config.paths.firmware_dir.clone()
    }

    /// Staged `userPrefs.jsonc` copies currently present in the tree.
    pub fn staged_configs(&self) -> Vec<PathBuf> {
        self.state
            .config
            .build
            .staging_paths
            .iter()
            .map(|p| self.firmware_dir().join(p))
            .filter(|p| p.exists())
            .collect()
    }
}
