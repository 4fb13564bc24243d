//! Paths inside the shared PlatformIO build tree.

use mtfw_core::config::BuildConfig;
use mtfw_core::variant::ARTIFACT_FILE_NAMES;
use std::path::{Path, PathBuf};
use tokio::fs;

/// The firmware checkout and the `.pio` state next to it.
#[derive(Clone, Debug)]
pub struct BuildTree {
    root: PathBuf,
    staging: Vec<PathBuf>,
}

impl BuildTree {
    /// `staging` entries are relative to `root`.
    pub fn new(root: impl Into<PathBuf>, staging: &[PathBuf]) -> Self {
        Self {
            root: root.into(),
            staging: staging.to_vec(),
        }
    }

    pub fn from_config(firmware_dir: &Path, config: &BuildConfig) -> Self {
        Self::new(firmware_dir, &config.staging_paths)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pio(&self) -> PathBuf {
        self.root.join(".pio")
    }

    /// Absolute locations the build reads `userPrefs.jsonc` from.
    pub fn staging_paths(&self) -> Vec<PathBuf> {
        self.staging.iter().map(|p| self.root.join(p)).collect()
    }

    /// `.pio/build`: default output root, one directory per variant.
    pub fn output_root(&self) -> PathBuf {
        self.pio().join("build")
    }

    pub fn variant_output_dir(&self, variant: &str) -> PathBuf {
        self.output_root().join(variant)
    }

    pub fn libdeps_dir(&self, variant: &str) -> PathBuf {
        self.pio().join("libdeps").join(variant)
    }

    pub fn libdeps_cache_dir(&self) -> PathBuf {
        self.pio().join("libdeps_cache")
    }

    pub fn build_cache_dir(&self) -> PathBuf {
        self.pio().join("build_cache")
    }

    pub fn core_dir(&self) -> PathBuf {
        self.pio().join("core")
    }

    /// Whether dependencies for `variant` are already installed.
    pub async fn has_dependencies(&self, variant: &str) -> bool {
        match fs::read_dir(self.libdeps_dir(variant)).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    }

    /// Number of `*.o` files directly under the variant's output directory.
    pub async fn object_count(&self, variant: &str) -> usize {
        let Ok(mut entries) = fs::read_dir(self.variant_output_dir(variant)).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().is_some_and(|ext| ext == "o") {
                count += 1;
            }
        }
        count
    }

    /// Artifact files currently present under every variant's output directory.
    pub async fn leftover_artifacts(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let Ok(mut variants) = fs::read_dir(self.output_root()).await else {
            return found;
        };
        while let Ok(Some(entry)) = variants.next_entry().await {
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            for name in ARTIFACT_FILE_NAMES {
                let path = entry.path().join(name);
                if fs::try_exists(&path).await.unwrap_or(false) {
                    found.push(path);
                }
            }
        }
        found
    }
}

/// Prefix of RAM-backed build directories.
pub const SCRATCH_PREFIX: &str = "pio_build_";

/// Pick the first usable scratch root and name the build directory in it.
///
/// A root qualifies if it exists, is a directory and is not read-only.
pub async fn scratch_dir_for(roots: &[PathBuf], variant: &str, now_secs: i64) -> Option<PathBuf> {
    for root in roots {
        let Ok(meta) = fs::metadata(root).await else {
            continue;
        };
        if meta.is_dir() && !meta.permissions().readonly() {
            return Some(root.join(format!("{SCRATCH_PREFIX}{variant}_{now_secs}")));
        }
    }
    None
}
