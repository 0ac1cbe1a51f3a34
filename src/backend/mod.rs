//! Conversion backends and the registry that orders them.
//!
//! Each backend wraps one external mechanism behind the [`Backend`] trait:
//!
//! ```text
//! soffice ──▶ LibreOffice, headless, one process per call
//! word    ──▶ Microsoft Word through osascript (macOS) / PowerShell COM (Windows)
//! <yours> ──▶ anything implementing Backend, registered by the caller
//! ```
//!
//! 1. [`soffice`] — the headless-suite adapter; serialised by a per-adapter
//!    lock because LibreOffice allows one instance per user profile
//! 2. [`native`]  — the native-engine adapter; only available where Word
//!    and its automation host are installed
//!
//! The [`BackendRegistry`] is built once at start-up and shared read-only
//! by every conversion.

pub mod native;
pub mod soffice;

use crate::config::ConversionConfig;
use crate::error::{FailureReason, Office2PdfError};
use crate::request::ConversionRequest;
use async_trait::async_trait;
use office_locate::{Candidate, CandidateTable, Locator, Platform, Tool};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use native::NativeWordBackend;
pub use soffice::SofficeBackend;

/// Names accepted in [`ConversionConfig::backend_order`].
pub const KNOWN_BACKENDS: &[&str] = &[soffice::NAME, native::NAME];

/// Whether a backend can be invoked right now, and if not, why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(FailureReason),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// The uniform contract every conversion mechanism satisfies.
///
/// # Contract
///
/// * `availability` is a cheap, read-only check (locator lookup, platform
///   test). It must not start a conversion.
/// * `invoke` writes the PDF to `request.target()` and returns that path.
///   Every failure comes back as a [`FailureReason`]; implementations must
///   not panic on a missing tool. A panic is still caught by the
///   orchestrator, but is logged as a fault.
/// * `invoke` honours `timeout`: an external process still running at the
///   ceiling is killed and the attempt returns [`FailureReason::Timeout`].
#[async_trait]
pub trait Backend: Send + Sync {
    async fn availability(&self) -> Availability;

    async fn is_available(&self) -> bool {
        self.availability().await.is_available()
    }

    async fn invoke(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<PathBuf, FailureReason>;
}

/// One registered backend: a unique name, its priority, and the adapter.
#[derive(Clone)]
pub struct BackendDescriptor {
    pub name: String,
    /// Lower is tried first.
    pub priority: u32,
    pub backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("backend", &"<dyn Backend>")
            .finish()
    }
}

/// Immutable set of descriptors, sorted by ascending priority.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    descriptors: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder {
            descriptors: Vec::new(),
        }
    }

    /// Build the built-in adapters named in `config.backend_order`, sharing
    /// one `locator`. The position in the list is the priority.
    pub fn from_config(
        config: &ConversionConfig,
        locator: Arc<Locator>,
    ) -> Result<Self, Office2PdfError> {
        let mut builder = Self::builder();
        for (priority, name) in config.backend_order.iter().enumerate() {
            let backend: Arc<dyn Backend> = match name.as_str() {
                soffice::NAME => Arc::new(SofficeBackend::new(
                    Arc::clone(&locator),
                    config.resolved_profile_dir(),
                )),
                native::NAME => Arc::new(NativeWordBackend::new(Arc::clone(&locator))),
                other => {
                    return Err(Office2PdfError::UnknownBackend {
                        name: other.to_string(),
                        known: KNOWN_BACKENDS.join(", "),
                    })
                }
            };
            builder = builder.register(name.clone(), priority as u32, backend);
        }
        builder.build()
    }

    /// Descriptors in try-order.
    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.descriptors.iter()
    }

    pub fn get(&self, name: &str) -> Option<&BackendDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Builder for [`BackendRegistry`].
pub struct BackendRegistryBuilder {
    descriptors: Vec<BackendDescriptor>,
}

impl BackendRegistryBuilder {
    pub fn register(
        mut self,
        name: impl Into<String>,
        priority: u32,
        backend: Arc<dyn Backend>,
    ) -> Self {
        self.descriptors.push(BackendDescriptor {
            name: name.into(),
            priority,
            backend,
        });
        self
    }

    /// Sort by priority (stable, so equal priorities keep registration
    /// order) and reject duplicate names.
    pub fn build(mut self) -> Result<BackendRegistry, Office2PdfError> {
        for (i, d) in self.descriptors.iter().enumerate() {
            if self.descriptors[..i].iter().any(|e| e.name == d.name) {
                return Err(Office2PdfError::DuplicateBackend(d.name.clone()));
            }
        }
        self.descriptors.sort_by_key(|d| d.priority);
        Ok(BackendRegistry {
            descriptors: self.descriptors,
        })
    }
}

/// The built-in candidate table plus the configured `soffice` overrides,
/// which are probed first on every platform.
pub fn candidate_table(config: &ConversionConfig) -> CandidateTable {
    let mut table = CandidateTable::builtin();
    for path in config.extra_candidates.iter().rev() {
        let candidate = Candidate::parse(&path.to_string_lossy());
        for platform in [Platform::Windows, Platform::MacOs, Platform::Unix] {
            table.prepend(platform, Tool::Soffice, candidate.clone());
        }
    }
    table
}
