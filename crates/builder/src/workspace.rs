//! Per-request working directories under the temp root.

use crate::error::BuildResult;
use mtfw_core::variant::FACTORY_FILE_NAME;
use mtfw_core::{ArtifactFormat, BuildId, PREFS_FILE_NAME};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// `<temp_root>/<build_id>/`, holding the request's config and output.
#[derive(Clone, Debug)]
pub struct RequestWorkspace {
    id: BuildId,
    dir: PathBuf,
}

impl RequestWorkspace {
    /// Create the directory for a new request.
    pub async fn create(temp_root: &Path, id: BuildId) -> BuildResult<Self> {
        let dir = temp_root.join(id.to_string());
        fs::create_dir_all(&dir).await?;
        Ok(Self { id, dir })
    }

    /// Refer to an existing request's directory without touching the disk.
    pub fn at(temp_root: &Path, id: BuildId) -> Self {
        let dir = temp_root.join(id.to_string());
        Self { id, dir }
    }

    pub fn id(&self) -> &BuildId {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(PREFS_FILE_NAME)
    }

    pub fn artifact_path(&self, format: ArtifactFormat) -> PathBuf {
        self.dir.join(format.file_name())
    }

    pub fn factory_path(&self) -> PathBuf {
        self.dir.join(FACTORY_FILE_NAME)
    }

    pub async fn write_config(&self, contents: &[u8]) -> BuildResult<PathBuf> {
        let path = self.config_path();
        fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Remove the directory. A directory that is already gone is not an error.
    pub async fn remove(&self) -> io::Result<bool> {
        remove_dir_if_present(&self.dir).await
    }
}

pub(crate) async fn remove_dir_if_present(dir: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
