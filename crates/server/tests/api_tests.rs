//! Integration tests for the configuration and status endpoints.

mod common;

use axum::http::{StatusCode, header};
use common::*;
use mtfw_builder::updater::write_version_file;
use mtfw_core::FirmwareVersion;
use serde_json::json;
use time::OffsetDateTime;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new();
    let (status, body) = send_json(&server.router, get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_variants_grouped_with_format() {
    let server = TestServer::new();
    let (status, body) = send_json(&server.router, get("/v1/variants")).await;
    assert_eq!(status, StatusCode::OK);

    let groups = body["manufacturers"].as_array().unwrap();
    assert!(!groups.is_empty());
    let all: Vec<_> = groups
        .iter()
        .flat_map(|g| g["variants"].as_array().unwrap().iter())
        .collect();
    let rak = all.iter().find(|v| v["id"] == "rak4631").unwrap();
    assert_eq!(rak["format"], "uf2");
    let tbeam = all.iter().find(|v| v["id"] == "tbeam").unwrap();
    assert_eq!(tbeam["format"], "bin");
}

#[tokio::test]
async fn test_preview_renders_channels() {
    let server = TestServer::new();
    let form = json!({
        "channels_to_write": "1",
        "channel_0[name]": "Primary",
        "channel_0[psk]": "AABB",
        "channel_1[name]": "Hidden",
    });

    let (status, body) = send_json(&server.router, post_json("/preview", &form)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let content = body["content"].as_str().unwrap();
    assert!(content.contains("\"USERPREFS_CHANNELS_TO_WRITE\": \"1\""));
    assert!(content.contains("\"USERPREFS_CHANNEL_0_PSK\": \"{ 0xAA, 0xBB }\""));
    assert!(!content.contains("Hidden"));
}

#[tokio::test]
async fn test_generate_returns_raw_document() {
    let server = TestServer::new();
    let form = json!({"device_name": "node-1", "lora_enabled": "true", "lora_region": "US"});

    let (status, headers, body) = send(&server.router, post_json("/generate", &form)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("\"USERPREFS_CONFIG_DEVICE_NAME\": \"node-1\""));
    assert!(text.contains("meshtastic_Config_LoRaConfig_RegionCode_US"));
}

#[tokio::test]
async fn test_generate_preview_only() {
    let server = TestServer::new();
    let form = json!({"device_name": "node-1", "preview_only": true});

    let (status, body) = send_json(&server.router, post_json("/generate", &form)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["content"].as_str().unwrap().contains("node-1"));
}

#[tokio::test]
async fn test_generate_rejects_bad_channel_count() {
    let server = TestServer::new();
    let form = json!({"channels_to_write": "many"});

    let (status, body) = send_json(&server.router, post_json("/generate", &form)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn test_generate_rejects_non_json() {
    let server = TestServer::new();
    let (status, body) = send_json(&server.router, post_form("/generate", "a=b")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_download_from_json() {
    let server = TestServer::new();
    let form = json!({"device_name": "node-1"});

    let (status, headers, body) = send(&server.router, post_json("/download", &form)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=userPrefs.jsonc"
    );
    assert!(String::from_utf8(body).unwrap().contains("node-1"));
}

#[tokio::test]
async fn test_download_from_hidden_form_field() {
    let server = TestServer::new();
    // config={"device_name":"node-2"}
    let body = "config=%7B%22device_name%22%3A%22node-2%22%7D";

    let (status, _, body) = send(&server.router, post_form("/download", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        String::from_utf8(body)
            .unwrap()
            .contains("\"USERPREFS_CONFIG_DEVICE_NAME\": \"node-2\"")
    );
}

#[tokio::test]
async fn test_download_rejects_malformed_config_field() {
    let server = TestServer::new();
    let (status, body) = send_json(&server.router, post_form("/download", "config=%7Bnope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid configuration")
    );
}

#[tokio::test]
async fn test_system_info_defaults() {
    let server = TestServer::new();
    let (status, body) = send_json(&server.router, get("/system-info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["firmware_version"], "Not installed");
    assert_eq!(body["last_updated"], "Never");
}

#[tokio::test]
async fn test_system_info_reads_version_file() {
    let server = TestServer::new();
    let version = FirmwareVersion::new("v2.6.11.60ec05e", OffsetDateTime::UNIX_EPOCH).unwrap();
    write_version_file(&server.state.config.paths.version_file, &version)
        .await
        .unwrap();

    let (_, body) = send_json(&server.router, get("/system-info")).await;
    assert_eq!(body["firmware_version"], "v2.6.11.60ec05e");
    assert_eq!(body["last_updated"], version.updated);
}

#[tokio::test]
async fn test_metrics_endpoint_toggle() {
    mtfw_server::metrics::register_metrics();
    let server = TestServer::new();
    let (status, _, body) = send(&server.router, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("mtfw_"));

    let server = TestServer::with_config(|c| c.server.metrics_enabled = false);
    let (status, _, _) = send(&server.router, get("/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_echoed() {
    let server = TestServer::new();
    let request = axum::http::Request::builder()
        .uri("/v1/health")
        .header("x-request-id", "client-42")
        .body(axum::body::Body::empty())
        .unwrap();
    let (_, headers, _) = send(&server.router, request).await;
    assert_eq!(headers["x-request-id"], "client-42");

    let (_, headers, _) = send(&server.router, get("/v1/health")).await;
    assert_eq!(headers["x-request-id"].len(), 32);
}
