//! Observer trait for per-attempt conversion events.
//!
//! Attach an [`Arc<dyn ConversionObserver>`] with
//! [`crate::convert::Converter::with_observer`] to follow a conversion as
//! the orchestrator walks the backend list. The CLI uses it to drive a
//! spinner; a server could forward events to a job record.
//!
//! # Example
//!
//! ```rust
//! use office2pdf::{ConversionObserver, FailureReason};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failures: AtomicUsize,
//! }
//!
//! impl ConversionObserver for FailureCounter {
//!     fn on_attempt_failed(&self, backend: &str, reason: &FailureReason) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{backend} failed: {reason}");
//!     }
//! }
//!
//! let observer: Arc<dyn ConversionObserver> = Arc::new(FailureCounter {
//!     failures: AtomicUsize::new(0),
//! });
//! # let _ = observer;
//! ```

use crate::error::FailureReason;
use crate::outcome::ConversionOutcome;
use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as it tries each backend.
///
/// Implementations must be `Send + Sync`: one observer may be shared by
/// concurrent conversions. All methods have default no-op implementations
/// so callers only override what they care about.
pub trait ConversionObserver: Send + Sync {
    /// Called once before the first backend is considered.
    ///
    /// # Arguments
    /// * `source`   — the document being converted
    /// * `backends` — number of registered backends
    fn on_conversion_start(&self, source: &Path, backends: usize) {
        let _ = (source, backends);
    }

    /// A backend reported itself unavailable and was not invoked.
    fn on_backend_skipped(&self, backend: &str, reason: &FailureReason) {
        let _ = (backend, reason);
    }

    /// Called just before `invoke`.
    ///
    /// # Arguments
    /// * `backend` — registry name
    /// * `index`   — 0-based position in the try-order
    /// * `total`   — number of registered backends
    fn on_attempt_start(&self, backend: &str, index: usize, total: usize) {
        let _ = (backend, index, total);
    }

    /// `invoke` ran and did not produce a PDF.
    fn on_attempt_failed(&self, backend: &str, reason: &FailureReason) {
        let _ = (backend, reason);
    }

    /// Called once with the final outcome, success or failure.
    fn on_conversion_complete(&self, outcome: &ConversionOutcome) {
        let _ = outcome;
    }
}

/// A no-op observer; the default when none is attached.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Convenience alias for the type stored in a [`crate::convert::Converter`].
pub type Observer = Arc<dyn ConversionObserver>;
