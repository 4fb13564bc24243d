//! Firmware build endpoint.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Multipart, State};
use mtfw_builder::ConfigSource;
use mtfw_core::{FormInput, classify};
use serde::Serialize;

/// Multipart fields of a build request.
#[derive(Debug, Default)]
pub struct BuildForm {
    pub variant: Option<String>,
    pub config_source: Option<String>,
    pub config_json: Option<String>,
    pub stored_config: Option<String>,
    pub custom_filename: Option<String>,
    /// Uploaded `userPrefs` part: (client filename, bytes).
    pub user_prefs: Option<(String, Vec<u8>)>,
}

impl BuildForm {
    /// Drain the multipart stream. Unknown fields are skipped.
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "userPrefs" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                form.user_prefs = Some((file_name, bytes.to_vec()));
                continue;
            }

            let slot = match name.as_str() {
                "variant" => &mut form.variant,
                "config_source" => &mut form.config_source,
                "config_json" => &mut form.config_json,
                "stored_config" => &mut form.stored_config,
                "custom_filename" => &mut form.custom_filename,
                _ => continue,
            };
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            *slot = Some(text);
        }
        Ok(form)
    }

    /// Resolve where the build's configuration comes from.
    pub fn config(self) -> ApiResult<ConfigSource> {
        match self.config_source.as_deref().unwrap_or("upload") {
            "current" => {
                let raw = self
                    .config_json
                    .filter(|s| !s.is_empty())
                    .or(self.stored_config.filter(|s| !s.is_empty()))
                    .ok_or_else(|| {
                        ApiError::BadRequest("No configuration data provided".to_string())
                    })?;
                let value: serde_json::Value = serde_json::from_str(&raw)
                    .map_err(|e| ApiError::BadRequest(format!("Invalid configuration: {e}")))?;
                let form = FormInput::from_json(&value)
                    .map_err(|e| ApiError::BadRequest(format!("Invalid configuration: {e}")))?;
                Ok(ConfigSource::Form(form))
            }
            _ => {
                let (file_name, bytes) = self
                    .user_prefs
                    .ok_or_else(|| ApiError::BadRequest("No userPrefs file uploaded".to_string()))?;
                if file_name.is_empty() {
                    return Err(ApiError::BadRequest("No file selected".to_string()));
                }
                Ok(ConfigSource::Upload(bytes))
            }
        }
    }
}

/// Successful build response.
#[derive(Debug, Serialize)]
pub struct BuildResponse {
    pub success: bool,
    pub message: String,
    pub download_url: String,
    pub build_id: String,
}

/// POST /build-firmware - Build firmware for a variant and configuration.
///
/// Responds once the build finished. The build itself runs in its own task
/// and completes its cleanup even if the client goes away.
pub async fn build_firmware(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<BuildResponse>> {
    let mut form = BuildForm::read(multipart).await?;

    let variant = form
        .variant
        .take()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No device variant specified".to_string()))?;
    let custom_filename = form
        .custom_filename
        .take()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());
    tracing::info!(
        variant = %variant,
        source = form.config_source.as_deref().unwrap_or("upload"),
        "Build firmware request"
    );
    let config = form.config()?;

    metrics::BUILDS_STARTED
        .with_label_values(&[classify(&variant).extension()])
        .inc();
    let in_flight = metrics::InFlightBuild::start();
    let result = state
        .builds
        .start_build(&variant, config, custom_filename.as_deref())
        .await;
    drop(in_flight);

    match result {
        Ok(receipt) => {
            metrics::BUILDS_SUCCEEDED.inc();
            metrics::record_build_timing(&receipt.timing);
            Ok(Json(BuildResponse {
                success: true,
                message: "Firmware built successfully".to_string(),
                download_url: receipt.download_url,
                build_id: receipt.build_id.to_string(),
            }))
        }
        Err(e) => {
            metrics::record_build_failure(e.reason());
            Err(ApiError::from_build_failure(e))
        }
    }
}
