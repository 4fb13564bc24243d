//! Firmware download endpoint.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use crate::sweeper::schedule_request_cleanup;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::{
    CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES, PRAGMA,
};
use axum::response::{IntoResponse, Response};
use mtfw_core::{ArtifactFormat, BuildId};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub variant: Option<String>,
    pub filename: Option<String>,
}

/// Replace anything outside word characters, `-` and `.` with `_`, and
/// make sure the name ends in the image's extension.
pub fn sanitize_filename(name: &str, format: ArtifactFormat) -> String {
    let mut clean: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let ext = format!(".{}", format.extension());
    if !clean.to_lowercase().ends_with(&ext) {
        clean.push_str(&ext);
    }
    clean
}

/// Name used when the client did not ask for one.
pub fn default_filename(variant: &str, format: ArtifactFormat) -> String {
    sanitize_filename(&format!("meshtastic_{variant}_firmware"), format)
}

/// `Content-Disposition` value with an ASCII fallback and an RFC 5987
/// `filename*` for non-ASCII names.
fn content_disposition(name: &str) -> String {
    if name.is_ascii() {
        return format!("attachment; filename=\"{name}\"");
    }
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    let encoded: String = name
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_') {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect();
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

/// GET /download-firmware/{build_id} - Stream a finished image.
///
/// The request directory is removed shortly after the response starts.
pub async fn download_firmware(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let build_id = BuildId::parse(&build_id)
        .map_err(|_| ApiError::NotFound("Firmware not found".to_string()))?;
    let variant = query
        .variant
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let handle = state
        .builds
        .open_artifact(&build_id, &variant)
        .await?
        .ok_or_else(|| ApiError::NotFound("Firmware not found".to_string()))?;

    let download_name = match query.filename.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => sanitize_filename(name, handle.format),
        _ => default_filename(&variant, handle.format),
    };

    let file = tokio::fs::File::open(&handle.path)
        .await
        .map_err(|e| ApiError::Internal(format!("open artifact: {e}")))?;
    let body = Body::from_stream(ReaderStream::new(file));

    tracing::info!(
        build_id = %build_id,
        variant = %variant,
        size = handle.size,
        "Serving firmware"
    );
    metrics::DOWNLOADS_SERVED.inc();
    schedule_request_cleanup(&state, handle.workspace).await;

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_LENGTH, handle.size.to_string()),
            (CONTENT_DISPOSITION, content_disposition(&download_name)),
            (CACHE_CONTROL, "no-cache, no-store, must-revalidate".to_string()),
            (PRAGMA, "no-cache".to_string()),
            (EXPIRES, "0".to_string()),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("my node/../x", ArtifactFormat::Uf2),
            "my_node_.._x.uf2"
        );
        assert_eq!(sanitize_filename("Base.UF2", ArtifactFormat::Uf2), "Base.UF2");
        assert_eq!(sanitize_filename("base.uf2", ArtifactFormat::Bin), "base.uf2.bin");
        assert_eq!(sanitize_filename("nœud", ArtifactFormat::Bin), "nœud.bin");
    }

    #[test]
    fn test_default_filename() {
        assert_eq!(
            default_filename("rak4631", ArtifactFormat::Uf2),
            "meshtastic_rak4631_firmware.uf2"
        );
        assert_eq!(
            default_filename("tbeam", ArtifactFormat::Bin),
            "meshtastic_tbeam_firmware.bin"
        );
    }

    #[test]
    fn test_content_disposition_encodes_unicode() {
        assert_eq!(
            content_disposition("a.bin"),
            "attachment; filename=\"a.bin\""
        );
        assert_eq!(
            content_disposition("é.bin"),
            "attachment; filename=\"_.bin\"; filename*=UTF-8''%C3%A9.bin"
        );
    }
}
