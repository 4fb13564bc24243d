//! Admin endpoints: manual cleanup and firmware source update.

use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::{AppState, TaskKind};
use crate::sweeper::run_sweep;
use axum::Json;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Url-encoded admin form.
#[derive(Debug, Default, Deserialize)]
pub struct AdminForm {
    #[serde(default)]
    pub admin_key: Option<String>,
}

fn admin_key(form: &Result<Form<AdminForm>, FormRejection>) -> Option<&str> {
    form.as_ref()
        .ok()
        .and_then(|Form(f)| f.admin_key.as_deref())
}

/// Cleanup response.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub builds_before: usize,
    pub builds_after: usize,
}

/// POST /cleanup - Run a retention sweep now.
pub async fn cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<AdminForm>, FormRejection>,
) -> ApiResult<Json<CleanupResponse>> {
    require_admin(&state.config.admin, &headers, admin_key(&form))?;

    let stats = run_sweep(&state.sweeper).await;
    let removed = stats.builds_before.saturating_sub(stats.builds_after);
    Ok(Json(CleanupResponse {
        success: true,
        message: format!(
            "Cleanup complete. Removed {removed} old build directories and any leftover userPrefs/UF2 files with PSK data."
        ),
        builds_before: stats.builds_before,
        builds_after: stats.builds_after,
    }))
}

/// Update acknowledgement.
#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub message: String,
}

/// POST /update-firmware - Start a firmware source update in the background.
pub async fn update_firmware(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<AdminForm>, FormRejection>,
) -> ApiResult<Json<UpdateResponse>> {
    require_admin(&state.config.admin, &headers, admin_key(&form))?;

    let updater = state.updater.clone();
    let started = state
        .tasks
        .spawn_exclusive(TaskKind::SourceUpdate, async move {
            match updater.update().await {
                Ok(version) => {
                    metrics::SOURCE_UPDATES.with_label_values(&["success"]).inc();
                    tracing::info!(tag = %version.tag, "Firmware source updated");
                }
                Err(e) => {
                    metrics::SOURCE_UPDATES.with_label_values(&["failure"]).inc();
                    tracing::error!(error = %e, "Firmware source update failed");
                }
            }
        })
        .await;

    if started.is_none() {
        return Err(ApiError::Conflict(
            "Firmware update already in progress".to_string(),
        ));
    }
    Ok(Json(UpdateResponse {
        success: true,
        message: "Firmware update started. This may take several minutes.".to_string(),
    }))
}
