//! Result types returned by the orchestrator.

use crate::error::{FailureReason, Office2PdfError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Whether a backend was passed over or actually tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// `is_available()` said no; `invoke` was never called.
    Skipped,
    /// `invoke` ran and did not produce a PDF.
    Failed,
}

/// One entry of the diagnostic log: which backend, what happened, why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub backend: String,
    pub disposition: Disposition,
    pub reason: FailureReason,
    /// Wall-clock time spent on this backend, availability check included.
    pub elapsed_ms: u64,
}

impl Attempt {
    pub fn is_skip(&self) -> bool {
        self.disposition == Disposition::Skipped
    }
}

/// A PDF that exists on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedPdf {
    /// Absolute path of the PDF.
    pub output_path: PathBuf,
    /// Size in bytes; always > 0.
    pub byte_size: u64,
    /// Name of the backend that produced it.
    pub backend: String,
    pub elapsed_ms: u64,
}

/// The result of one `convert` call. Constructed once, never mutated.
///
/// The success branch deliberately carries no attempt log: earlier
/// backends that failed before the winner are only reported through
/// tracing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Success(ConvertedPdf),
    Failure { attempts: Vec<Attempt> },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success(_))
    }

    /// The attempt log; empty on success.
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            ConversionOutcome::Success(_) => &[],
            ConversionOutcome::Failure { attempts } => attempts,
        }
    }

    /// Convert into a `Result`, mapping `Failure` to
    /// [`Office2PdfError::AllBackendsFailed`].
    pub fn into_result(self) -> Result<ConvertedPdf, Office2PdfError> {
        match self {
            ConversionOutcome::Success(pdf) => Ok(pdf),
            ConversionOutcome::Failure { attempts } => {
                Err(Office2PdfError::AllBackendsFailed { attempts })
            }
        }
    }
}
