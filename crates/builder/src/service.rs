//! Request-level entry points: start a build, open its artifact.

use crate::error::{BuildError, BuildResult};
use crate::orchestrator::{BuildArtifact, BuildRequest, ConfigSource, Orchestrator, TimingBreakdown};
use crate::workspace::RequestWorkspace;
use mtfw_core::variant::is_valid_variant_id;
use mtfw_core::{ArtifactFormat, BuildId, Variant, classify};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Returned by a successful build.
#[derive(Clone, Debug)]
pub struct BuildReceipt {
    pub build_id: BuildId,
    pub download_url: String,
    pub artifact: BuildArtifact,
    pub timing: TimingBreakdown,
}

/// A finished artifact ready to stream.
#[derive(Clone, Debug)]
pub struct ArtifactHandle {
    pub workspace: RequestWorkspace,
    pub path: PathBuf,
    pub format: ArtifactFormat,
    pub size: u64,
}

/// Relative URL the client downloads the artifact from.
pub fn download_url(build_id: &BuildId, variant: &str, custom_filename: Option<&str>) -> String {
    let path = format!("/download-firmware/{build_id}");
    let Ok(mut url) = reqwest::Url::parse("http://localhost") else {
        return path;
    };
    url.set_path(&path);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("variant", variant);
        if let Some(name) = custom_filename.filter(|n| !n.is_empty()) {
            query.append_pair("filename", name);
        }
    }
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    }
}

/// Creates request directories and runs builds detached from the caller.
#[derive(Clone)]
pub struct BuildService {
    temp_root: PathBuf,
    orchestrator: Arc<Orchestrator>,
}

impl BuildService {
    pub fn new(temp_root: PathBuf, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            temp_root,
            orchestrator,
        }
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Build `variant` and wait for the result.
    ///
    /// The build runs in its own task: dropping this future does not cancel
    /// it, so scrubbing always completes.
    pub async fn start_build(
        &self,
        variant: &str,
        config: ConfigSource,
        custom_filename: Option<&str>,
    ) -> BuildResult<BuildReceipt> {
        if !is_valid_variant_id(variant) {
            return Err(BuildError::Config(format!("invalid variant: {variant:?}")));
        }

        let workspace = RequestWorkspace::create(&self.temp_root, BuildId::new()).await?;
        let build_id = workspace.id().clone();
        let board = Variant::find(variant).map(|v| v.name);
        tracing::info!(
            build_id = %build_id,
            variant,
            board = board.unwrap_or("uncatalogued"),
            "Build requested"
        );
        if self.orchestrator.locks().is_variant_busy(variant) {
            tracing::info!(build_id = %build_id, variant, "Variant already building, queued");
        }

        let request = BuildRequest {
            workspace,
            variant: variant.to_string(),
            config,
        };
        let orchestrator = self.orchestrator.clone();
        let outcome = tokio::spawn(async move { orchestrator.build(request).await })
            .await
            .map_err(|e| BuildError::Io(std::io::Error::other(format!("build task failed: {e}"))))?;

        let artifact = outcome.result?;
        Ok(BuildReceipt {
            download_url: download_url(&build_id, variant, custom_filename),
            build_id,
            artifact,
            timing: outcome.timing,
        })
    }

    /// Find the artifact of a finished build. `None` if the request
    /// directory or its image is gone.
    pub async fn open_artifact(
        &self,
        build_id: &BuildId,
        variant: &str,
    ) -> BuildResult<Option<ArtifactHandle>> {
        let workspace = RequestWorkspace::at(&self.temp_root, build_id.clone());
        if !fs::try_exists(workspace.dir()).await.unwrap_or(false) {
            return Ok(None);
        }

        let preferred = classify(variant);
        let mut candidates = Vec::with_capacity(3);
        match preferred {
            ArtifactFormat::Uf2 => {
                candidates.push((workspace.artifact_path(ArtifactFormat::Uf2), ArtifactFormat::Uf2));
                candidates.push((workspace.factory_path(), ArtifactFormat::Bin));
                candidates.push((workspace.artifact_path(ArtifactFormat::Bin), ArtifactFormat::Bin));
            }
            ArtifactFormat::Bin => {
                candidates.push((workspace.factory_path(), ArtifactFormat::Bin));
                candidates.push((workspace.artifact_path(ArtifactFormat::Bin), ArtifactFormat::Bin));
                candidates.push((workspace.artifact_path(ArtifactFormat::Uf2), ArtifactFormat::Uf2));
            }
        }

        for (path, format) in candidates {
            match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {
                    return Ok(Some(ArtifactHandle {
                        workspace,
                        path,
                        format,
                        size: meta.len(),
                    }));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}
