//! Preferences generation endpoints.

use crate::error::{ApiError, ApiResult};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Form, FromRequest, Request};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use mtfw_core::{PREFS_FILE_NAME, generate_prefs};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rendered document returned to the editor.
#[derive(Debug, Serialize)]
pub struct PrefsResponse {
    pub success: bool,
    pub content: String,
}

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<Value> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

/// POST /generate - Render the form. Returns the raw document, or
/// `{success, content}` when `preview_only` is set.
pub async fn generate(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<Response> {
    let form = json_body(payload)?;
    let content = generate_prefs(&form)?;

    if is_truthy(form.get("preview_only")) {
        return Ok(Json(PrefsResponse {
            success: true,
            content,
        })
        .into_response());
    }
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], content).into_response())
}

/// POST /preview - Render the form for display.
pub async fn preview(
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<PrefsResponse>> {
    let form = json_body(payload)?;
    let content = generate_prefs(&form)?;
    tracing::debug!(keys = form.as_object().map_or(0, |o| o.len()), "Rendered preview");
    Ok(Json(PrefsResponse {
        success: true,
        content,
    }))
}

/// Hidden-input form post used by the download button.
#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    #[serde(default)]
    pub config: Option<String>,
}

/// POST /download - Render the form as an attachment. Accepts a JSON body
/// or a url-encoded `config` field holding the JSON.
pub async fn download(req: Request) -> ApiResult<Response> {
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let form = if is_json {
        json_body(Json::<Value>::from_request(req, &()).await)?
    } else {
        let Form(body) = Form::<DownloadForm>::from_request(req, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let raw = body.config.unwrap_or_else(|| "{}".to_string());
        serde_json::from_str(&raw)
            .map_err(|e| ApiError::BadRequest(format!("Invalid configuration: {e}")))?
    };

    let content = generate_prefs(&form)?;
    Ok((
        [
            (CONTENT_TYPE, "application/json".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename={PREFS_FILE_NAME}"),
            ),
        ],
        content,
    )
        .into_response())
}
