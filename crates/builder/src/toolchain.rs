//! External compiler seam.

use crate::error::{BuildError, BuildResult};
use crate::layout::BuildTree;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::instrument;

/// Captured result of a toolchain invocation.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn from_output(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Knobs for a single compile.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub jobs: usize,
    /// Output directory override (RAM-backed scratch), if any.
    pub scratch_dir: Option<PathBuf>,
    /// Route CC/CXX through ccache.
    pub ccache: bool,
}

/// Operations the orchestrator needs from the firmware toolchain.
///
/// Implementations run external processes; dropping a returned future must
/// stop the underlying process.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Install library dependencies for one variant.
    async fn install_dependencies(&self, tree: &BuildTree, variant: &str)
    -> BuildResult<CommandOutput>;

    /// Compile one variant.
    async fn compile(
        &self,
        tree: &BuildTree,
        variant: &str,
        options: &CompileOptions,
    ) -> BuildResult<CommandOutput>;

    /// Install packages for every environment of a fresh source tree.
    async fn setup_project(&self, tree: &BuildTree) -> BuildResult<CommandOutput>;
}

/// PlatformIO CLI toolchain.
#[derive(Clone, Debug)]
pub struct PlatformIo {
    program: String,
}

impl PlatformIo {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether ccache is available on PATH.
    pub fn ccache_available() -> bool {
        which::which("ccache").is_ok()
    }

    fn command(&self, tree: &BuildTree) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(tree.root())
            .env("PLATFORMIO_FORCE_COLOR", "false")
            .env("PLATFORMIO_NO_ANSI", "1")
            .env("PLATFORMIO_LIBDEPS_CACHE_DIR", tree.libdeps_cache_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command) -> BuildResult<CommandOutput> {
        let output = cmd
            .output()
            .await
            .map_err(|e| BuildError::Toolchain(format!("failed to run {}: {e}", self.program)))?;
        Ok(CommandOutput::from_output(output))
    }
}

#[async_trait]
impl Toolchain for PlatformIo {
    #[instrument(skip(self, tree))]
    async fn install_dependencies(
        &self,
        tree: &BuildTree,
        variant: &str,
    ) -> BuildResult<CommandOutput> {
        let mut cmd = self.command(tree);
        cmd.args(["pkg", "install", "-e", variant, "--silent"]);
        self.run(cmd).await
    }

    #[instrument(skip(self, tree, options), fields(jobs = options.jobs))]
    async fn compile(
        &self,
        tree: &BuildTree,
        variant: &str,
        options: &CompileOptions,
    ) -> BuildResult<CommandOutput> {
        let mut cmd = self.command(tree);
        cmd.args(["run", "-e", variant, "--jobs"])
            .arg(options.jobs.to_string())
            .args(["--silent", "--disable-auto-clean"])
            .env("PLATFORMIO_BUILD_CACHE_DIR", tree.build_cache_dir())
            .env("PLATFORMIO_CORE_DIR", tree.core_dir());

        if options.ccache {
            cmd.env("CC", "ccache gcc").env("CXX", "ccache g++");
        }
        if let Some(scratch) = &options.scratch_dir {
            cmd.env("PLATFORMIO_BUILD_DIR", scratch);
        }
        self.run(cmd).await
    }

    #[instrument(skip(self, tree))]
    async fn setup_project(&self, tree: &BuildTree) -> BuildResult<CommandOutput> {
        let mut cmd = self.command(tree);
        cmd.args(["pkg", "install"]);
        self.run(cmd).await
    }
}
