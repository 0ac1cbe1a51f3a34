//! # office2pdf
//!
//! Convert Word documents to PDF by driving whichever external converter
//! the host actually has: headless LibreOffice, or Microsoft Word through
//! the platform's automation layer.
//!
//! ## Why an orchestrator?
//!
//! No single converter is present everywhere. A Linux container has
//! LibreOffice and nothing else; a Windows desktop may have only Word; a
//! Mac may have both. This crate keeps an ordered list of backends, skips
//! the ones that are not installed, and falls through to the next one when
//! a conversion fails, returning either a PDF on disk or a structured log
//! of every attempt.
//!
//! ## Flow
//!
//! ```text
//! ConversionRequest (validated source → target)
//!  │
//!  ├─ for each backend, in priority order
//!  │   ├─ availability()   locator lookup / platform check; skip if unavailable
//!  │   └─ invoke(timeout)  external process, killed at the ceiling
//!  │
//!  ├─ first PDF on disk → ConversionOutcome::Success
//!  └─ list exhausted    → ConversionOutcome::Failure { attempts }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use office2pdf::{ConversionConfig, ConversionRequest, Converter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .backend_order(["soffice", "word"])
//!         .timeout_secs(60)
//!         .build()?;
//!     let converter = Converter::from_config(&config)?;
//!
//!     let request = ConversionRequest::new("report.docx", "report.pdf")?;
//!     match converter.convert(&request).await.into_result() {
//!         Ok(pdf) => println!("{} bytes via {}", pdf.byte_size, pdf.backend),
//!         Err(e) => eprintln!("{e}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `office2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | Enables [`server`], the axum upload/convert/download surface |
//!
//! Disable both when using only the library:
//! ```toml
//! office2pdf = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod outcome;
pub mod probe;
pub mod process;
pub mod progress;
pub mod request;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{Availability, Backend, BackendDescriptor, BackendRegistry};
pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::Converter;
pub use diagnostics::DebugReport;
pub use error::{FailureReason, Office2PdfError};
pub use outcome::{Attempt, ConversionOutcome, ConvertedPdf, Disposition};
pub use probe::{probe, probe_detailed, BackendStatus};
pub use progress::{ConversionObserver, NoopObserver, Observer};
pub use request::ConversionRequest;

pub use office_locate;
