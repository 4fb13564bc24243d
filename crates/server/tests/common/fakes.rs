//! In-process stand-ins for PlatformIO and the release updater.

use async_trait::async_trait;
use mtfw_builder::error::BuildResult;
use mtfw_builder::{BuildError, BuildTree, CommandOutput, CompileOptions, SourceUpdater, Toolchain};
use mtfw_core::FirmwareVersion;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::Notify;

/// Compiler double: writes the named images or fails with stderr.
#[allow(dead_code)]
pub struct FakeToolchain {
    pub files: Vec<&'static str>,
    pub stderr: Option<&'static str>,
    pub compiles: AtomicUsize,
}

#[allow(dead_code)]
impl FakeToolchain {
    pub fn producing(files: &[&'static str]) -> Self {
        Self {
            files: files.to_vec(),
            stderr: None,
            compiles: AtomicUsize::new(0),
        }
    }

    pub fn failing(stderr: &'static str) -> Self {
        Self {
            files: Vec::new(),
            stderr: Some(stderr),
            compiles: AtomicUsize::new(0),
        }
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn install_dependencies(
        &self,
        tree: &BuildTree,
        variant: &str,
    ) -> BuildResult<CommandOutput> {
        tokio::fs::create_dir_all(tree.libdeps_dir(variant).join("RadioLib")).await?;
        Ok(CommandOutput {
            success: true,
            exit_code: Some(0),
            ..Default::default()
        })
    }

    async fn compile(
        &self,
        tree: &BuildTree,
        variant: &str,
        options: &CompileOptions,
    ) -> BuildResult<CommandOutput> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if let Some(stderr) = self.stderr {
            return Ok(CommandOutput {
                success: false,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            });
        }

        let out = match &options.scratch_dir {
            Some(scratch) => scratch.join(variant),
            None => tree.variant_output_dir(variant),
        };
        tokio::fs::create_dir_all(&out).await?;
        for name in &self.files {
            tokio::fs::write(out.join(name), format!("image:{name}")).await?;
        }
        Ok(CommandOutput {
            success: true,
            exit_code: Some(0),
            ..Default::default()
        })
    }

    async fn setup_project(&self, _tree: &BuildTree) -> BuildResult<CommandOutput> {
        Ok(CommandOutput {
            success: true,
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

/// Updater double. Blocks until released when `gate` is set.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeUpdater {
    pub calls: AtomicUsize,
    pub gate: Option<Notify>,
    pub fail: bool,
}

#[allow(dead_code)]
impl FakeUpdater {
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Default::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceUpdater for FakeUpdater {
    async fn update(&self) -> BuildResult<FirmwareVersion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(BuildError::Update("release query failed".to_string()));
        }
        Ok(FirmwareVersion::new("v2.6.11", OffsetDateTime::now_utc())?)
    }
}
