//! HTTP surface tests: the router driven in-process with `oneshot`, backed
//! by fake adapters so no converter needs to be installed.

#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use office2pdf::office_locate::{CandidateTable, Locator};
use office2pdf::server::{router, AppState};
use office2pdf::{
    Availability, Backend, BackendRegistry, ConversionConfig, ConversionRequest, Converter,
    FailureReason,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

const BOUNDARY: &str = "office2pdf-test-boundary";

struct Fake {
    succeed: bool,
}

#[async_trait]
impl Backend for Fake {
    async fn availability(&self) -> Availability {
        Availability::Available
    }

    async fn invoke(
        &self,
        request: &ConversionRequest,
        _timeout: Duration,
    ) -> Result<PathBuf, FailureReason> {
        if self.succeed {
            std::fs::write(request.target(), b"%PDF-1.7\n% converted\n%%EOF\n").unwrap();
            Ok(request.target().to_path_buf())
        } else {
            Err(FailureReason::ProcessNonZeroExit {
                code: Some(81),
                stderr_excerpt: "javaldx: Could not find a Java Runtime Environment!".into(),
            })
        }
    }
}

fn state(upload_dir: &Path, succeed: bool, config: ConversionConfig) -> AppState {
    let registry = BackendRegistry::builder()
        .register("fake", 0, Arc::new(Fake { succeed }))
        .build()
        .unwrap();
    let converter = Converter::new(registry, Duration::from_secs(5))
        .with_allowed_extensions(config.allowed_extensions.clone());
    let locator = Arc::new(Locator::new(CandidateTable::empty()).with_search_path(None));
    AppState::from_parts(converter, config, locator, upload_dir)
}

fn multipart(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

// ── Status endpoints ─────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_backend_availability() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path(), true, ConversionConfig::default()));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_string());
    assert_eq!(json["conversion_tools"]["fake"], true);
}

#[tokio::test]
async fn debug_returns_well_formed_report() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path(), true, ConversionConfig::default()));

    let response = app
        .oneshot(Request::get("/debug").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert!(json["system"]["os"].is_string());
    assert!(json["tools"]["soffice"]["found_path"].is_null());
    assert!(json["environment"]["PATH"].is_string());
    assert!(json["file_system"].is_object());
}

// ── POST /convert ────────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_returns_pdf_attachment_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path(), true, ConversionConfig::default()));

    let response = app
        .oneshot(multipart("word_file", "Quarterly Report.docx", b"PK\x03\x04 fake docx"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Quarterly_Report_converted.pdf\""
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"%PDF"));
    assert!(is_empty_dir(dir.path()), "upload dir not cleaned up");
}

#[tokio::test]
async fn wrong_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path(), true, ConversionConfig::default()));

    let response = app
        .oneshot(multipart("word_file", "slides.pptx", b"PK fake"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "invalid_type");
    assert!(is_empty_dir(dir.path()));
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path(), true, ConversionConfig::default()));

    let response = app
        .oneshot(multipart("attachment", "report.docx", b"PK fake"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "no_file");
    assert!(json["error"]["hint"].is_string());
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path(), true, ConversionConfig::default()));

    let response = app
        .oneshot(multipart("word_file", "report.docx", b""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "empty_file");
    assert!(is_empty_dir(dir.path()));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .max_upload_bytes(16)
        .build()
        .unwrap();
    let app = router(state(dir.path(), true, config));

    let response = app
        .oneshot(multipart("word_file", "report.docx", &[b'x'; 256]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["error"]["code"], "too_large");
    assert!(is_empty_dir(dir.path()));
}

#[tokio::test]
async fn failed_conversion_reports_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path(), false, ConversionConfig::default()));

    let response = app
        .oneshot(multipart("word_file", "report.doc", b"\xD0\xCF\x11\xE0 fake doc"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "conversion_failed");
    let attempts = json["error"]["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["backend"], "fake");
    assert_eq!(attempts[0]["reason"]["kind"], "process_non_zero_exit");
    assert_eq!(attempts[0]["reason"]["code"], 81);
    assert!(is_empty_dir(dir.path()), "upload must be removed on failure too");
}
