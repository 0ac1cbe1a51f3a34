//! Validated conversion requests.
//!
//! A [`ConversionRequest`] is checked once, up front, so adapters can assume
//! the source is a readable whitelisted document and the target directory
//! exists. Adapters still treat every filesystem step as fallible.

use crate::config::DEFAULT_EXTENSIONS;
use crate::error::Office2PdfError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An immutable, validated `source → target` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    source: PathBuf,
    target: PathBuf,
}

impl ConversionRequest {
    /// Validate against the default `doc`/`docx` whitelist.
    pub fn new(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Result<Self, Office2PdfError> {
        Self::with_extensions(source, target, DEFAULT_EXTENSIONS)
    }

    /// Validate against an explicit extension whitelist (lowercase, no dot).
    pub fn with_extensions<S: AsRef<str>>(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        allowed: &[S],
    ) -> Result<Self, Office2PdfError> {
        let source = source.into();
        let target = target.into();

        if !source.is_file() {
            return Err(Office2PdfError::SourceNotFound { path: source });
        }
        match std::fs::File::open(&source) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(Office2PdfError::PermissionDenied { path: source });
            }
            Err(_) => return Err(Office2PdfError::SourceNotFound { path: source }),
        }

        if !has_allowed_extension(&source, allowed) {
            let allowed = allowed
                .iter()
                .map(|e| e.as_ref())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Office2PdfError::UnsupportedExtension {
                path: source,
                allowed,
            });
        }

        if absolute(&source) == absolute(&target) {
            return Err(Office2PdfError::SameSourceAndTarget { path: source });
        }

        let dir = parent_dir(&target);
        let writable = std::fs::metadata(&dir)
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false);
        if !writable {
            return Err(Office2PdfError::TargetDirNotWritable { dir });
        }

        debug!(source = %source.display(), target = %target.display(), "request validated");
        Ok(Self { source, target })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The directory that receives the PDF (`.` for a bare file name).
    pub fn target_dir(&self) -> PathBuf {
        parent_dir(&self.target)
    }
}

/// `true` when `path`'s extension (case-insensitive) is in `allowed`.
pub fn has_allowed_extension<S: AsRef<str>>(path: &Path, allowed: &[S]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            allowed.iter().any(|a| a.as_ref().eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
