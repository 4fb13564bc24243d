//! Health, catalog and version endpoints.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use mtfw_builder::updater::read_version_file;
use mtfw_core::{FirmwareVersion, Variant};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health - Liveness probe.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct VariantEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub format: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ManufacturerGroup {
    pub manufacturer: &'static str,
    pub variants: Vec<VariantEntry>,
}

#[derive(Debug, Serialize)]
pub struct VariantsResponse {
    pub success: bool,
    pub manufacturers: Vec<ManufacturerGroup>,
}

/// GET /v1/variants - Supported targets grouped by manufacturer.
pub async fn list_variants() -> Json<VariantsResponse> {
    let manufacturers = Variant::by_manufacturer()
        .into_iter()
        .map(|(manufacturer, members)| ManufacturerGroup {
            manufacturer,
            variants: members
                .into_iter()
                .map(|v| VariantEntry {
                    id: v.id,
                    name: v.name,
                    format: v.format().extension(),
                })
                .collect(),
        })
        .collect();
    Json(VariantsResponse {
        success: true,
        manufacturers,
    })
}

#[derive(Debug, Serialize)]
pub struct SystemInfoResponse {
    pub success: bool,
    pub firmware_version: String,
    pub last_updated: String,
}

/// GET /system-info - Installed firmware source version.
pub async fn system_info(State(state): State<AppState>) -> Json<SystemInfoResponse> {
    let version = match read_version_file(&state.config.paths.version_file).await {
        Ok(Some(version)) => version,
        Ok(None) => FirmwareVersion::not_installed(),
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable firmware version file");
            FirmwareVersion::not_installed()
        }
    };
    Json(SystemInfoResponse {
        success: true,
        firmware_version: version.tag,
        last_updated: version.updated,
    })
}
