//! Build orchestration.
//!
//! One build runs as: acquire variant lock -> dependencies cached -> config
//! staged -> cache-warm check -> compile -> locate and copy artifact ->
//! scrub. The scrub runs on every exit path; a [`ScrubGuard`] covers the
//! paths where the future never reaches it.

use crate::error::{BuildError, BuildResult};
use crate::layout::{BuildTree, scratch_dir_for};
use crate::locator::{locate, locate_factory, search_roots};
use crate::locks::BuildTreeLocks;
use crate::scrubber::{ScrubGuard, ScrubPlan, ScrubReport, Scrubber};
use crate::toolchain::{CompileOptions, PlatformIo, Toolchain};
use crate::workspace::RequestWorkspace;
use mtfw_core::config::BuildConfig;
use mtfw_core::{ArtifactFormat, BuildId, BuildState, FormInput, classify, emit};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::fs;

/// Where a build's configuration comes from.
#[derive(Clone, Debug)]
pub enum ConfigSource {
    /// Generated from the configuration form.
    Form(FormInput),
    /// A `userPrefs.jsonc` uploaded as-is.
    Upload(Vec<u8>),
}

impl ConfigSource {
    /// Bytes of the `userPrefs.jsonc` document.
    pub fn render(&self) -> BuildResult<Vec<u8>> {
        match self {
            ConfigSource::Form(form) => Ok(emit(form).to_jsonc()?.into_bytes()),
            ConfigSource::Upload(bytes) => Ok(bytes.clone()),
        }
    }
}

/// A single build request.
#[derive(Debug)]
pub struct BuildRequest {
    pub workspace: RequestWorkspace,
    pub variant: String,
    pub config: ConfigSource,
}

/// The produced firmware.
#[derive(Clone, Debug)]
pub struct BuildArtifact {
    /// Where the compiler wrote it (already scrubbed by the time the build returns).
    pub path: PathBuf,
    /// Copy in the request directory served to the client.
    pub download_path: PathBuf,
    pub format: ArtifactFormat,
    /// Copy of `firmware.factory.bin`, when the build produced one.
    pub factory: Option<PathBuf>,
}

/// Wall time per build phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimingBreakdown {
    pub dependencies: Duration,
    pub file_operations: Duration,
    pub cache_warming: Duration,
    pub compilation: Duration,
    pub post_build: Duration,
    pub cleanup: Duration,
    pub total: Duration,
}

/// Result of [`Orchestrator::build`].
#[derive(Debug)]
pub struct BuildOutcome {
    pub build_id: BuildId,
    pub variant: String,
    pub state: BuildState,
    pub result: BuildResult<BuildArtifact>,
    pub timing: TimingBreakdown,
    pub scrub: ScrubReport,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

fn advance(state: &mut BuildState, next: BuildState) {
    debug_assert!(state.can_transition_to(next), "{state} -> {next}");
    tracing::debug!(from = %state, to = %next, "Build state");
    *state = next;
}

/// Runs builds against one shared build tree.
pub struct Orchestrator {
    tree: BuildTree,
    config: BuildConfig,
    toolchain: Arc<dyn Toolchain>,
    locks: Arc<BuildTreeLocks>,
    ccache: bool,
}

impl Orchestrator {
    pub fn new(
        tree: BuildTree,
        config: BuildConfig,
        toolchain: Arc<dyn Toolchain>,
        locks: Arc<BuildTreeLocks>,
    ) -> Self {
        let ccache = config.use_ccache && PlatformIo::ccache_available();
        if ccache {
            tracing::info!("Using ccache for compilation");
        }
        Self {
            tree,
            config,
            toolchain,
            locks,
            ccache,
        }
    }

    pub fn tree(&self) -> &BuildTree {
        &self.tree
    }

    pub fn locks(&self) -> &Arc<BuildTreeLocks> {
        &self.locks
    }

    /// Run one build to completion. Never returns before scrubbing.
    #[tracing::instrument(
        skip_all,
        fields(build_id = %request.workspace.id(), variant = %request.variant)
    )]
    pub async fn build(&self, request: BuildRequest) -> BuildOutcome {
        let started = Instant::now();
        let mut timing = TimingBreakdown::default();
        let mut state = BuildState::Created;
        let variant = request.variant.as_str();
        let format = classify(variant);

        let _lease = self.locks.acquire_variant(variant).await;
        tracing::info!(format = %format, "Starting firmware build");

        let phase = Instant::now();
        self.ensure_dependencies(variant).await;
        timing.dependencies = phase.elapsed();

        let scratch = scratch_dir_for(
            &self.config.scratch_roots,
            variant,
            OffsetDateTime::now_utc().unix_timestamp(),
        )
        .await;

        let success_plan = ScrubPlan {
            staged_configs: self.tree.staging_paths(),
            request_config: Some(request.workspace.config_path()),
            artifact_dirs: vec![self.tree.variant_output_dir(variant)],
            scratch_dir: scratch.clone(),
            request_dir: None,
        };
        let failure_plan = success_plan
            .clone()
            .with_request_dir(request.workspace.dir());

        let staging = self.locks.acquire_staging().await;
        let guard = ScrubGuard::new(failure_plan);

        let result = self
            .run_stages(&request, format, scratch.as_deref(), &mut timing, &mut state)
            .await;

        let phase = Instant::now();
        let failure_plan = guard.disarm();
        let plan = if result.is_ok() {
            &success_plan
        } else {
            &failure_plan
        };
        let scrub = Scrubber.scrub(plan).await;
        drop(staging);
        timing.cleanup = phase.elapsed();

        match &result {
            Ok(_) => {
                advance(&mut state, BuildState::Scrubbed);
                advance(&mut state, BuildState::ReadyForDownload);
            }
            Err(_) => advance(&mut state, BuildState::Failed),
        }
        timing.total = started.elapsed();

        match &result {
            Ok(artifact) => tracing::info!(
                artifact = %artifact.download_path.display(),
                total_secs = timing.total.as_secs_f64(),
                dependencies_secs = timing.dependencies.as_secs_f64(),
                file_operations_secs = timing.file_operations.as_secs_f64(),
                cache_warming_secs = timing.cache_warming.as_secs_f64(),
                compilation_secs = timing.compilation.as_secs_f64(),
                post_build_secs = timing.post_build.as_secs_f64(),
                cleanup_secs = timing.cleanup.as_secs_f64(),
                "Build completed"
            ),
            Err(e) => tracing::warn!(
                reason = e.reason(),
                total_secs = timing.total.as_secs_f64(),
                "Build failed"
            ),
        }

        BuildOutcome {
            build_id: request.workspace.id().clone(),
            variant: request.variant.clone(),
            state,
            result,
            timing,
            scrub,
        }
    }

    async fn run_stages(
        &self,
        request: &BuildRequest,
        format: ArtifactFormat,
        scratch: Option<&Path>,
        timing: &mut TimingBreakdown,
        state: &mut BuildState,
    ) -> BuildResult<BuildArtifact> {
        let variant = request.variant.as_str();

        advance(state, BuildState::Configuring);
        let phase = Instant::now();
        let contents = request.config.render()?;
        request.workspace.write_config(&contents).await?;
        self.stage_config(&contents).await?;
        timing.file_operations = phase.elapsed();

        let phase = Instant::now();
        let objects = self.tree.object_count(variant).await;
        if objects > self.config.warm_object_threshold {
            tracing::info!(objects, "Build cache is warm");
        } else {
            tracing::info!(objects, "Build cache is cold");
        }
        timing.cache_warming = phase.elapsed();

        advance(state, BuildState::Compiling);
        let phase = Instant::now();
        let options = CompileOptions {
            jobs: self.config.jobs(),
            scratch_dir: scratch.map(Path::to_path_buf),
            ccache: self.ccache,
        };
        let compile = self.toolchain.compile(&self.tree, variant, &options);
        let output = match self.config.compile_timeout() {
            Some(limit) => tokio::time::timeout(limit, compile)
                .await
                .map_err(|_| BuildError::CompileTimedOut(limit.as_secs()))??,
            None => compile.await?,
        };
        timing.compilation = phase.elapsed();

        if !output.success {
            tracing::warn!(exit_code = ?output.exit_code, "Compiler exited with failure");
            return Err(BuildError::CompileFailed {
                stderr: output.stderr,
            });
        }

        let phase = Instant::now();
        let roots = search_roots(scratch, self.tree.output_root());
        let located = locate(variant, &roots, format)
            .await
            .ok_or(BuildError::ArtifactNotFound)?;
        advance(state, BuildState::ArtifactLocated);

        let copy = request.workspace.artifact_path(format);
        fs::copy(&located, &copy).await?;

        let factory = match format {
            ArtifactFormat::Bin => match locate_factory(variant, &roots).await {
                Some(found) => {
                    let dest = request.workspace.factory_path();
                    fs::copy(&found, &dest).await?;
                    Some(dest)
                }
                None => {
                    tracing::warn!("No factory image produced, serving application image");
                    None
                }
            },
            ArtifactFormat::Uf2 => None,
        };
        timing.post_build = phase.elapsed();

        Ok(BuildArtifact {
            path: located,
            download_path: factory.clone().unwrap_or(copy),
            format,
            factory,
        })
    }

    /// Install dependencies unless already cached. Failures are only logged.
    async fn ensure_dependencies(&self, variant: &str) {
        if self.tree.has_dependencies(variant).await {
            tracing::debug!("Dependencies already cached");
            return;
        }

        let limit = self.config.dependency_timeout();
        let install = self.toolchain.install_dependencies(&self.tree, variant);
        match tokio::time::timeout(limit, install).await {
            Ok(Ok(out)) if out.success => tracing::info!("Dependencies cached"),
            Ok(Ok(out)) => tracing::warn!(
                exit_code = ?out.exit_code,
                stderr = %out.stderr.trim(),
                "Dependency installation failed, continuing"
            ),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Could not install dependencies, continuing")
            }
            Err(_) => tracing::warn!(
                timeout_secs = limit.as_secs(),
                "Dependency installation timed out, continuing"
            ),
        }
    }

    async fn stage_config(&self, contents: &[u8]) -> BuildResult<()> {
        for path in self.tree.staging_paths() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&path, contents).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_form_source_renders_prefs() {
        let form = FormInput::from_json(&json!({"device_name": "node"})).unwrap();
        let text = String::from_utf8(ConfigSource::Form(form).render().unwrap()).unwrap();
        assert!(text.contains("\"USERPREFS_CONFIG_DEVICE_NAME\": \"node\""));
    }

    #[test]
    fn test_upload_source_is_verbatim() {
        let bytes = b"{ \"USERPREFS_TZ_STRING\": \"UTC\" }".to_vec();
        assert_eq!(ConfigSource::Upload(bytes.clone()).render().unwrap(), bytes);
    }
}
