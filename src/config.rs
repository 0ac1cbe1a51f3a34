//! Configuration types for document-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The backend priority order lives here
//! rather than in code because it legitimately differs between deployments:
//! a Linux server wants LibreOffice first, a Windows desktop may prefer Word.

use crate::backend::KNOWN_BACKENDS;
use crate::error::Office2PdfError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Extensions accepted when no whitelist is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["doc", "docx"];

/// Default HTTP upload ceiling: 16 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Configuration for document conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use office2pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .backend_order(["word", "soffice"])
///     .timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.backend_order[0], "word");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Backends in try-order; the index is the priority. Default: `soffice`, `word`.
    pub backend_order: Vec<String>,

    /// Hard ceiling for one backend attempt, in seconds. Default: 120.
    ///
    /// A wedged converter (modal dialog, profile lock) is killed when this
    /// expires and the next backend is tried.
    pub timeout_secs: u64,

    /// Writable home directory handed to LibreOffice.
    /// If None, uses [`default_profile_dir`].
    pub profile_dir: Option<PathBuf>,

    /// Accepted source extensions, lowercase, without the dot. Default: `doc`, `docx`.
    pub allowed_extensions: Vec<String>,

    /// Upload ceiling for the HTTP surface in bytes. Default: 16 MiB.
    pub max_upload_bytes: u64,

    /// Extra `soffice` locations probed before the built-in table.
    pub extra_candidates: Vec<PathBuf>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            backend_order: vec!["soffice".to_string(), "word".to_string()],
            timeout_secs: 120,
            profile_dir: None,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            extra_candidates: Vec::new(),
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured profile directory, or the default one.
    pub fn resolved_profile_dir(&self) -> PathBuf {
        self.profile_dir.clone().unwrap_or_else(default_profile_dir)
    }
}

/// Where LibreOffice keeps its user profile when none is configured.
///
/// - **macOS**: `~/Library/Caches/office2pdf/profile/`
/// - **Linux**: `~/.cache/office2pdf/profile/`
/// - **Windows**: `%LOCALAPPDATA%\office2pdf\profile\`
///
/// Falls back to the system temp dir for service accounts without a home.
pub fn default_profile_dir() -> PathBuf {
    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("office2pdf").join("profile")
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn backend_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.backend_order = order
            .into_iter()
            .map(|s| s.into().trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.profile_dir = Some(dir.into());
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.into().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn extra_candidate(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.extra_candidates.push(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Office2PdfError> {
        let c = &self.config;
        if c.timeout_secs == 0 {
            return Err(Office2PdfError::InvalidConfig(
                "Timeout must be ≥ 1 second".into(),
            ));
        }
        if c.allowed_extensions.is_empty() {
            return Err(Office2PdfError::InvalidConfig(
                "At least one allowed extension is required".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(Office2PdfError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        for (i, name) in c.backend_order.iter().enumerate() {
            if !KNOWN_BACKENDS.contains(&name.as_str()) {
                return Err(Office2PdfError::UnknownBackend {
                    name: name.clone(),
                    known: KNOWN_BACKENDS.join(", "),
                });
            }
            if c.backend_order[..i].contains(name) {
                return Err(Office2PdfError::DuplicateBackend(name.clone()));
            }
        }
        Ok(self.config)
    }
}
