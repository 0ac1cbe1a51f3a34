//! Error types for the office2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Office2PdfError`] — **Fatal** for one call: the request is invalid,
//!   the configuration is wrong, or every backend failed. Returned as
//!   `Err(Office2PdfError)` from the `Result`-returning entry points.
//!
//! * [`FailureReason`] — **Non-fatal**: one backend could not convert the
//!   document (not installed, crashed, timed out) but the next backend may
//!   still succeed. Stored inside [`crate::outcome::Attempt`] so callers see
//!   why each backend was passed over.

use crate::outcome::Attempt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the office2pdf library.
///
/// Per-backend failures use [`FailureReason`] and are aggregated into
/// [`Office2PdfError::AllBackendsFailed`] rather than propagated one by one.
#[derive(Debug, Error)]
pub enum Office2PdfError {
    // ── Request errors ────────────────────────────────────────────────────
    /// Source document was not found, or is not a regular file.
    #[error("Source document not found: '{path}'\nCheck the path exists and is a file.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the source.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Source extension is not on the whitelist.
    #[error("Unsupported document type '{path}' (allowed: {allowed})")]
    UnsupportedExtension { path: PathBuf, allowed: String },

    /// Source and target resolve to the same file.
    #[error("Source and target are the same file: '{path}'")]
    SameSourceAndTarget { path: PathBuf },

    /// The directory that should receive the PDF is missing or read-only.
    #[error("Output directory '{dir}' does not exist or is not writable")]
    TargetDirNotWritable { dir: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A backend name in the priority list is not known.
    #[error("Unknown backend '{name}' (known: {known})")]
    UnknownBackend { name: String, known: String },

    /// Two descriptors share a name.
    #[error("Backend '{0}' is registered more than once")]
    DuplicateBackend(String),

    // ── Conversion errors ─────────────────────────────────────────────────
    /// Every registered backend was skipped or failed.
    #[error("All {} conversion backends failed: {}", .attempts.len(), summarize(.attempts))]
    AllBackendsFailed { attempts: Vec<Attempt> },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Office2PdfError {
    /// The attempt log, when this is an aggregate conversion failure.
    pub fn attempts(&self) -> Option<&[Attempt]> {
        match self {
            Office2PdfError::AllBackendsFailed { attempts } => Some(attempts),
            _ => None,
        }
    }
}

fn summarize(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no backends are registered".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.backend, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why one backend did not produce a PDF.
///
/// Recorded per attempt; the orchestrator always moves on to the next
/// backend after any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The converter executable is not installed anywhere we looked.
    #[error("{tool} executable not found")]
    BinaryNotFound { tool: String },

    /// The document-automation facility does not exist on this platform.
    #[error("document engine unavailable: {detail}")]
    EngineUnavailable { detail: String },

    /// The converter ran but exited unsuccessfully.
    #[error("process exited with {}: {stderr_excerpt}", exit_code_text(.code))]
    ProcessNonZeroExit {
        code: Option<i32>,
        stderr_excerpt: String,
    },

    /// The converter did not finish before the ceiling and was killed.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The converter reported success but no (or an empty) PDF appeared.
    #[error("converter reported success but produced no output at '{expected}'")]
    OutputMissingAfterSuccess { expected: PathBuf },

    /// The document-automation facility raised an error.
    #[error("document engine error: {detail}")]
    EngineError { detail: String },

    /// The converter could not be started at all.
    #[error("failed to start converter: {detail}")]
    SpawnFailed { detail: String },

    /// Filesystem work around the conversion failed (staging, rename).
    #[error("I/O error: {detail}")]
    Io { detail: String },

    /// The adapter panicked or otherwise broke its contract.
    #[error("unexpected backend fault: {detail}")]
    Fault { detail: String },
}

impl FailureReason {
    /// Stable snake_case name of the variant, matching the serialised `kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::BinaryNotFound { .. } => "binary_not_found",
            FailureReason::EngineUnavailable { .. } => "engine_unavailable",
            FailureReason::ProcessNonZeroExit { .. } => "process_non_zero_exit",
            FailureReason::Timeout { .. } => "timeout",
            FailureReason::OutputMissingAfterSuccess { .. } => "output_missing_after_success",
            FailureReason::EngineError { .. } => "engine_error",
            FailureReason::SpawnFailed { .. } => "spawn_failed",
            FailureReason::Io { .. } => "io",
            FailureReason::Fault { .. } => "fault",
        }
    }
}

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}
