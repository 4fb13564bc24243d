//! Replaces the firmware source tree with the latest upstream release.

use crate::error::{BuildError, BuildResult};
use crate::layout::BuildTree;
use crate::locks::BuildTreeLocks;
use crate::toolchain::Toolchain;
use crate::workspace::remove_dir_if_present;
use async_trait::async_trait;
use mtfw_core::FirmwareVersion;
use mtfw_core::config::UpdateConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs;
use tokio::process::Command;
use tracing::instrument;

/// Fetches and installs a new firmware source tree.
#[async_trait]
pub trait SourceUpdater: Send + Sync {
    /// Install the latest release and return the recorded version.
    async fn update(&self) -> BuildResult<FirmwareVersion>;
}

/// Subset of the GitHub release payload we use.
#[derive(Clone, Debug, Deserialize)]
pub struct ReleaseInfo {
    pub tag_name: String,
    #[serde(default)]
    pub published_at: Option<String>,
}

/// Read the version file. `Ok(None)` when it does not exist yet.
pub async fn read_version_file(path: &Path) -> BuildResult<Option<FirmwareVersion>> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(Some(FirmwareVersion::parse(&text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write the version file via a temporary sibling and rename.
pub async fn write_version_file(path: &Path, version: &FirmwareVersion) -> BuildResult<()> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, version.render()).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Release tags end up in directory names and on a git command line.
fn is_safe_tag(tag: &str) -> bool {
    !tag.is_empty()
        && !tag.starts_with('-')
        && !tag.contains("..")
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// GitHub release API + shallow git clone.
pub struct GithubReleaseUpdater {
    client: reqwest::Client,
    config: UpdateConfig,
    tree: BuildTree,
    version_file: PathBuf,
    toolchain: Arc<dyn Toolchain>,
    locks: Arc<BuildTreeLocks>,
}

impl GithubReleaseUpdater {
    pub fn new(
        config: UpdateConfig,
        tree: BuildTree,
        version_file: PathBuf,
        toolchain: Arc<dyn Toolchain>,
        locks: Arc<BuildTreeLocks>,
    ) -> BuildResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mtfw-builder/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| BuildError::Update(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            tree,
            version_file,
            toolchain,
            locks,
        })
    }

    /// Query the latest release.
    #[instrument(skip(self))]
    pub async fn latest_release(&self) -> BuildResult<ReleaseInfo> {
        let release: ReleaseInfo = self
            .client
            .get(&self.config.release_api_url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BuildError::Update(format!("release query failed: {e}")))?
            .json()
            .await
            .map_err(|e| BuildError::Update(format!("invalid release payload: {e}")))?;

        if !is_safe_tag(&release.tag_name) {
            return Err(BuildError::Update(format!(
                "refusing release tag {:?}",
                release.tag_name
            )));
        }
        tracing::info!(
            tag = %release.tag_name,
            published_at = ?release.published_at,
            "Latest release"
        );
        Ok(release)
    }

    fn sibling(&self, label: &str) -> PathBuf {
        let root = self.tree.root();
        let parent = root.parent().unwrap_or(Path::new("."));
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "firmware".to_string());
        parent.join(format!(
            ".{name}-{label}-{}",
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ))
    }

    /// Shallow-clone `tag` next to the current tree.
    #[instrument(skip(self))]
    pub async fn fetch_source(&self, tag: &str) -> BuildResult<PathBuf> {
        let dest = self.sibling(tag);
        let output = Command::new("git")
            .args(["clone", "--depth", "1", "--branch", tag, "--"])
            .arg(&self.config.repository_url)
            .arg(&dest)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BuildError::Update(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let _ = remove_dir_if_present(&dest).await;
            return Err(BuildError::Update(format!(
                "git clone failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(dest)
    }

    /// Swap `source` in as the build tree, record `tag`, and set up packages.
    ///
    /// Waits for in-flight builds and blocks new ones until done.
    #[instrument(skip(self, source))]
    pub async fn install_source(&self, tag: &str, source: &Path) -> BuildResult<FirmwareVersion> {
        let _lease = self.locks.acquire_exclusive().await;
        let root = self.tree.root();

        let previous = if fs::try_exists(root).await.unwrap_or(false) {
            let old = self.sibling("old");
            fs::rename(root, &old).await?;
            Some(old)
        } else {
            None
        };

        if let Err(e) = fs::rename(source, root).await {
            if let Some(old) = &previous {
                if let Err(restore) = fs::rename(old, root).await {
                    tracing::error!(error = %restore, "Failed to restore previous firmware tree");
                }
            }
            return Err(e.into());
        }

        if let Some(old) = previous {
            if let Err(e) = remove_dir_if_present(&old).await {
                tracing::warn!(dir = %old.display(), error = %e, "Failed to remove previous tree");
            }
        }

        let version = FirmwareVersion::new(tag, OffsetDateTime::now_utc())?;
        write_version_file(&self.version_file, &version).await?;
        tracing::info!(tag, "Firmware source installed");

        let setup = self.toolchain.setup_project(&self.tree).await?;
        if !setup.success {
            return Err(BuildError::Update(format!(
                "package setup failed: {}",
                setup.stderr.trim()
            )));
        }
        Ok(version)
    }
}

#[async_trait]
impl SourceUpdater for GithubReleaseUpdater {
    async fn update(&self) -> BuildResult<FirmwareVersion> {
        let release = self.latest_release().await?;
        let source = self.fetch_source(&release.tag_name).await?;
        match self.install_source(&release.tag_name, &source).await {
            Ok(version) => Ok(version),
            Err(e) => {
                let _ = remove_dir_if_present(&source).await;
                Err(e)
            }
        }
    }
}
