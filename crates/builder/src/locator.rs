//! Finds the file a build produced.

use mtfw_core::ArtifactFormat;
use mtfw_core::variant::FACTORY_FILE_NAME;
use std::path::{Path, PathBuf};
use tokio::fs;

async fn first_existing(variant: &str, roots: &[PathBuf], file_name: &str) -> Option<PathBuf> {
    for root in roots {
        let candidate = root.join(variant).join(file_name);
        if fs::try_exists(&candidate).await.unwrap_or(false) {
            return Some(candidate);
        }
    }
    None
}

/// Look for `<root>/<variant>/<firmware file>` in each root, in order.
pub async fn locate(variant: &str, roots: &[PathBuf], format: ArtifactFormat) -> Option<PathBuf> {
    first_existing(variant, roots, format.file_name()).await
}

/// Look for the ESP32 factory image next to the application image.
pub async fn locate_factory(variant: &str, roots: &[PathBuf]) -> Option<PathBuf> {
    first_existing(variant, roots, FACTORY_FILE_NAME).await
}

/// Search roots for a build: scratch output first, then the tree's default.
pub fn search_roots(scratch: Option<&Path>, default_root: PathBuf) -> Vec<PathBuf> {
    scratch
        .map(Path::to_path_buf)
        .into_iter()
        .chain(std::iter::once(default_root))
        .collect()
}
