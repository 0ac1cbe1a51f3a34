//! HTTP surface: upload a Word document, get a PDF back.
//!
//! ```text
//! GET  /health   → {"status":"healthy","timestamp":…,"conversion_tools":{name: bool}}
//! GET  /debug    → DebugReport
//! POST /convert  → multipart field `word_file` → application/pdf
//! ```
//!
//! Uploads and outputs live in `upload_dir` only for the duration of one
//! request. Both are held by [`ScratchFile`] guards, so they are removed on
//! every exit path, including a client that disconnects mid-conversion.

use crate::config::ConversionConfig;
use crate::convert::Converter;
use crate::diagnostics;
use crate::error::Office2PdfError;
use crate::outcome::Attempt;
use crate::probe;
use crate::request::has_allowed_extension;
use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use office_locate::Locator;
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Multipart field carrying the document.
pub const FILE_FIELD: &str = "word_file";

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared, read-only state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub converter: Converter,
    pub config: Arc<ConversionConfig>,
    pub locator: Arc<Locator>,
    pub upload_dir: PathBuf,
}

impl AppState {
    /// Build the converter and locator from `config`.
    pub fn new(config: ConversionConfig, upload_dir: impl Into<PathBuf>) -> Result<Self, Office2PdfError> {
        let locator = Arc::new(Locator::new(crate::backend::candidate_table(&config)));
        let converter = Converter::from_config_with_locator(&config, Arc::clone(&locator))?;
        Ok(Self::from_parts(converter, config, locator, upload_dir))
    }

    /// Assemble state from pre-built parts (custom registries, tests).
    pub fn from_parts(
        converter: Converter,
        config: ConversionConfig,
        locator: Arc<Locator>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            converter,
            config: Arc::new(config),
            locator,
            upload_dir: upload_dir.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/health", get(health))
        .route("/debug", get(debug_report))
        .route("/convert", post(convert_upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Log the capability summary, then serve until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&state.upload_dir).await?;

    let statuses = probe::probe_detailed(state.converter.registry()).await;
    for status in &statuses {
        match &status.reason {
            None => info!(backend = %status.name, "available"),
            Some(reason) => warn!(backend = %status.name, %reason, "unavailable"),
        }
    }
    info!("{}", probe::summary(&statuses));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, upload_dir = %state.upload_dir.display(), "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Everything `/convert` and `/debug` can answer with instead of a body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file selected")]
    NoFile,

    #[error("Invalid file type. Allowed: {allowed}")]
    InvalidType { allowed: String },

    #[error("File is empty. Please select a valid Word document.")]
    EmptyFile,

    #[error("File too large. Maximum size is {} bytes", .limit)]
    TooLarge { limit: u64 },

    #[error("Malformed multipart request: {0}")]
    InvalidForm(String),

    #[error("Conversion failed with every available backend")]
    ConversionFailed { attempts: Vec<Attempt> },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFile
            | ApiError::InvalidType { .. }
            | ApiError::EmptyFile
            | ApiError::InvalidForm(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ConversionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NoFile => "no_file",
            ApiError::InvalidType { .. } => "invalid_type",
            ApiError::EmptyFile => "empty_file",
            ApiError::TooLarge { .. } => "too_large",
            ApiError::InvalidForm(_) => "invalid_form",
            ApiError::ConversionFailed { .. } => "conversion_failed",
            ApiError::Internal(_) => "internal",
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            ApiError::NoFile => Some("Send the document in the `word_file` multipart field."),
            ApiError::ConversionFailed { .. } => {
                Some("Check that LibreOffice or Microsoft Word is installed; see GET /debug.")
            }
            _ => None,
        }
    }
}

/// The body limit can fire inside the multipart parser before the handler
/// has counted anything; report it as the same `too_large`.
fn multipart_error(err: MultipartError, limit: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::TooLarge { limit }
    } else {
        ApiError::InvalidForm(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(hint) = self.hint() {
            body["hint"] = hint.into();
        }
        if let ApiError::ConversionFailed { attempts } = &self {
            body["attempts"] = serde_json::to_value(attempts).unwrap_or_default();
        }
        (status, Json(json!({ "error": body }))).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Response {
    let tools = probe::probe(state.converter.registry()).await;
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "conversion_tools": tools,
    }))
    .into_response()
}

async fn debug_report(State(state): State<AppState>) -> Result<Response, ApiError> {
    let locator = Arc::clone(&state.locator);
    let report = tokio::task::spawn_blocking(move || diagnostics::collect(&locator))
        .await
        .map_err(|e| ApiError::Internal(format!("diagnostics task failed: {e}")))?;
    Ok(Json(report).into_response())
}

async fn convert_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let limit = state.config.max_upload_bytes;
    let allowed = &state.config.allowed_extensions;

    let field = loop {
        let next = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, limit))?;
        match next {
            Some(field) if field.name() == Some(FILE_FIELD) => break field,
            Some(_) => continue,
            None => return Err(ApiError::NoFile),
        }
    };

    let original = field
        .file_name()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ApiError::NoFile)?
        .to_string();
    if !has_allowed_extension(Path::new(&original), allowed) {
        return Err(ApiError::InvalidType {
            allowed: allowed.join(", "),
        });
    }
    let filename = sanitize_filename(&original);

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("upload dir: {e}")))?;

    let upload = ScratchFile::new(
        state
            .upload_dir
            .join(format!("{}_{filename}", Uuid::new_v4())),
    );
    let size = save_field(field, upload.path(), limit).await?;
    if size == 0 {
        return Err(ApiError::EmptyFile);
    }
    info!(file = %original, bytes = size, "upload received");

    let stem = Path::new(&filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let download_name = format!("{stem}_converted.pdf");
    let output = ScratchFile::new(
        state
            .upload_dir
            .join(format!("{}_{download_name}", Uuid::new_v4())),
    );

    let pdf = match state.converter.convert_files(upload.path(), output.path()).await {
        Ok(pdf) => pdf,
        Err(Office2PdfError::AllBackendsFailed { attempts }) => {
            warn!(file = %original, attempts = attempts.len(), "conversion failed");
            return Err(ApiError::ConversionFailed { attempts });
        }
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    };

    let bytes = tokio::fs::read(&pdf.output_path)
        .await
        .map_err(|e| ApiError::Internal(format!("reading converted PDF: {e}")))?;
    info!(file = %original, backend = %pdf.backend, bytes = bytes.len(), "sending PDF");
    Ok(pdf_response(bytes, &download_name))
}

/// Stream `field` into `path`, enforcing `limit`. Returns the byte count.
async fn save_field(mut field: Field<'_>, path: &Path, limit: u64) -> Result<u64, ApiError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ApiError::Internal(format!("creating upload: {e}")))?;
    let mut written: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        written += chunk.len() as u64;
        if written > limit {
            return Err(ApiError::TooLarge { limit });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(format!("writing upload: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::Internal(format!("writing upload: {e}")))?;
    Ok(written)
}

fn pdf_response(bytes: Vec<u8>, download_name: &str) -> Response {
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{download_name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// Reduce a client-supplied file name to `[A-Za-z0-9._-]`, with no
/// directory components and no leading dots.
///
/// Falls back to `document.<ext>` when nothing usable is left.
pub fn sanitize_filename(name: &str) -> String {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    let original_ext = extension(name);
    let has_stem = Path::new(trimmed)
        .file_stem()
        .map(|s| !s.is_empty())
        .unwrap_or(false);
    if has_stem && extension(trimmed) == original_ext {
        return trimmed.to_string();
    }
    match original_ext {
        Some(ext) => format!("document.{ext}"),
        None => "document".to_string(),
    }
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
}

/// A request-scoped file, deleted when dropped.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove scratch file: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_specials() {
        assert_eq!(sanitize_filename("../../etc/passwd.docx"), "etc_passwd.docx");
        assert_eq!(sanitize_filename("My Report (final).docx"), "My_Report_final.docx");
        assert_eq!(sanitize_filename(r"C:\Users\me\memo.doc"), "C_Users_me_memo.doc");
        assert_eq!(sanitize_filename("plain.docx"), "plain.docx");
    }

    #[test]
    fn sanitize_falls_back_when_nothing_is_left() {
        assert_eq!(sanitize_filename("отчёт.docx"), "document.docx");
        assert_eq!(sanitize_filename("..."), "document");
    }

    #[test]
    fn error_codes_and_statuses() {
        assert_eq!(ApiError::NoFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::TooLarge { limit: 1 }.code(), "too_large");
        assert_eq!(
            ApiError::ConversionFailed { attempts: vec![] }.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError::Internal("x".into()).code(), "internal");
    }

    #[test]
    fn scratch_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.docx");
        std::fs::write(&path, b"x").unwrap();
        drop(ScratchFile::new(path.clone()));
        assert!(!path.exists());
        // Dropping a guard whose file never existed is fine.
        drop(ScratchFile::new(dir.path().join("never")));
    }
}
