//! Request ids and admin-key authorization.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use mtfw_core::config::AdminConfig;
use sha2::{Digest, Sha256};
use tracing::Instrument;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const REQUEST_ID_MAX: usize = 64;

/// Correlates log lines of one request. Echoed back in `x-request-id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept a client-supplied id if it is short and made of safe characters.
    pub fn from_header(value: &str) -> Option<Self> {
        let ok = !value.is_empty()
            && value.len() <= REQUEST_ID_MAX
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        ok.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Run the request inside a span tagged with its request id.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestId::from_header)
        .unwrap_or_else(RequestId::generate);
    let span = tracing::info_span!("request", request_id = %id, path = %req.uri().path());
    req.extensions_mut().insert(id.clone());

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Compare equal-length strings without short-circuiting.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Check a presented admin key against the configured credential.
///
/// Both sides are reduced to SHA256 hex digests before comparing.
pub fn verify_admin_key(config: &AdminConfig, presented: Option<&str>) -> ApiResult<()> {
    let Some(presented) = presented.filter(|k| !k.is_empty()) else {
        return Err(ApiError::Unauthorized("Unauthorized".to_string()));
    };

    let expected = match &config.password_hash {
        Some(hash) => hash
            .strip_prefix("sha256:")
            .unwrap_or(hash)
            .to_ascii_lowercase(),
        None => sha256_hex(&config.password),
    };

    if constant_time_eq(sha256_hex(presented).as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        tracing::warn!("Rejected admin request with invalid key");
        Err(ApiError::Unauthorized("Unauthorized".to_string()))
    }
}

/// Admin key from the `admin_key` form field, falling back to a bearer token.
pub fn require_admin(
    config: &AdminConfig,
    headers: &HeaderMap,
    form_key: Option<&str>,
) -> ApiResult<()> {
    let presented = form_key
        .filter(|k| !k.is_empty())
        .or_else(|| bearer_token(headers));
    verify_admin_key(config, presented)
}
