//! The conversion orchestrator.
//!
//! ## State machine (one per `convert` call)
//!
//! ```text
//! Start ─▶ TryNextBackend ─┬─ unavailable ─▶ record Skipped ─▶ TryNextBackend
//!                          ├─ invoke fails ─▶ record Failed  ─▶ TryNextBackend
//!                          ├─ invoke ok + PDF on disk ───────▶ Success (done)
//!                          └─ list exhausted ────────────────▶ Failure{attempts}
//! ```
//!
//! The first success short-circuits: later backends are never touched, so a
//! document is converted at most once. Nothing here is shared between calls
//! except the read-only [`BackendRegistry`] (and, through the adapters, the
//! locator cache and per-adapter locks).

use crate::backend::{self, Availability, Backend, BackendRegistry};
use crate::config::{ConversionConfig, DEFAULT_EXTENSIONS};
use crate::error::{FailureReason, Office2PdfError};
use crate::outcome::{Attempt, ConversionOutcome, ConvertedPdf, Disposition};
use crate::progress::{NoopObserver, Observer};
use crate::request::ConversionRequest;
use office_locate::Locator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runs conversions against a shared backend registry.
///
/// Cheap to clone; clones share the registry and observer.
///
/// # Example
///
/// ```rust,no_run
/// use office2pdf::{ConversionConfig, Converter};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let converter = Converter::from_config(&ConversionConfig::default())?;
/// let pdf = converter.convert_files("report.docx", "report.pdf").await?;
/// println!("{} ({} bytes, via {})", pdf.output_path.display(), pdf.byte_size, pdf.backend);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Converter {
    registry: Arc<BackendRegistry>,
    timeout: Duration,
    allowed_extensions: Vec<String>,
    observer: Observer,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("backends", &self.registry.names())
            .field("timeout", &self.timeout)
            .field("allowed_extensions", &self.allowed_extensions)
            .finish()
    }
}

/// What one attempt came to, before it is turned into an [`Attempt`].
enum Step {
    Skipped(FailureReason),
    Failed(FailureReason),
    Converted(PathBuf),
}

impl Converter {
    /// A converter over an explicit registry, with the default whitelist.
    pub fn new(registry: impl Into<Arc<BackendRegistry>>, timeout: Duration) -> Self {
        Self {
            registry: registry.into(),
            timeout,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Build the built-in adapters from `config` with a fresh locator.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Office2PdfError> {
        let locator = Arc::new(Locator::new(backend::candidate_table(config)));
        Self::from_config_with_locator(config, locator)
    }

    /// Like [`Converter::from_config`], sharing an existing locator (and its
    /// cache) with other components such as the diagnostics report.
    pub fn from_config_with_locator(
        config: &ConversionConfig,
        locator: Arc<Locator>,
    ) -> Result<Self, Office2PdfError> {
        let registry = BackendRegistry::from_config(config, locator)?;
        Ok(Self::new(registry, config.timeout())
            .with_allowed_extensions(config.allowed_extensions.clone()))
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions;
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Try every registered backend in priority order until one produces
    /// a PDF.
    ///
    /// Never fails outright: every problem, including an adapter panic,
    /// becomes an [`Attempt`] in the returned `Failure`.
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionOutcome {
        let started = Instant::now();
        let total = self.registry.len();
        info!(
            source = %request.source().display(),
            backends = total,
            "starting conversion"
        );
        self.observer.on_conversion_start(request.source(), total);

        let mut attempts = Vec::with_capacity(total);

        for (index, descriptor) in self.registry.iter().enumerate() {
            let name = descriptor.name.as_str();
            let attempt_start = Instant::now();

            let step = self
                .attempt(Arc::clone(&descriptor.backend), request, name, index, total)
                .await;
            let elapsed_ms = attempt_start.elapsed().as_millis() as u64;

            let (disposition, reason) = match step {
                Step::Converted(path) => match verify_output(&path) {
                    Ok(byte_size) => {
                        let path = std::path::absolute(&path).unwrap_or(path);
                        info!(
                            backend = %name,
                            output = %path.display(),
                            byte_size,
                            elapsed_ms,
                            "conversion succeeded"
                        );
                        let outcome = ConversionOutcome::Success(ConvertedPdf {
                            output_path: path,
                            byte_size,
                            backend: name.to_string(),
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        });
                        self.observer.on_conversion_complete(&outcome);
                        return outcome;
                    }
                    Err(reason) => (Disposition::Failed, reason),
                },
                Step::Skipped(reason) => (Disposition::Skipped, reason),
                Step::Failed(reason) => (Disposition::Failed, reason),
            };

            match disposition {
                Disposition::Skipped => {
                    info!(backend = %name, %reason, "backend unavailable; skipping");
                    self.observer.on_backend_skipped(name, &reason);
                }
                Disposition::Failed => {
                    warn!(backend = %name, %reason, elapsed_ms, "backend failed");
                    self.observer.on_attempt_failed(name, &reason);
                }
            }
            attempts.push(Attempt {
                backend: name.to_string(),
                disposition,
                reason,
                elapsed_ms,
            });
        }

        warn!(
            source = %request.source().display(),
            attempts = attempts.len(),
            "all conversion backends failed"
        );
        let outcome = ConversionOutcome::Failure { attempts };
        self.observer.on_conversion_complete(&outcome);
        outcome
    }

    /// Validate `source → target` against this converter's whitelist and
    /// convert it.
    pub async fn convert_files(
        &self,
        source: impl AsRef<Path>,
        target: impl AsRef<Path>,
    ) -> Result<ConvertedPdf, Office2PdfError> {
        let request = ConversionRequest::with_extensions(
            source.as_ref(),
            target.as_ref(),
            &self.allowed_extensions,
        )?;
        self.convert(&request).await.into_result()
    }

    /// Synchronous wrapper around [`Converter::convert_files`].
    ///
    /// Creates a temporary tokio runtime internally, so it must not be
    /// called from inside an async context.
    pub fn convert_sync(
        &self,
        source: impl AsRef<Path>,
        target: impl AsRef<Path>,
    ) -> Result<ConvertedPdf, Office2PdfError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| Office2PdfError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.convert_files(source, target))
    }

    /// Availability check then invoke, in a task of its own so an adapter
    /// panic surfaces as a `JoinError` instead of unwinding through us.
    ///
    /// The task is aborted if this future is dropped: a cancelled caller
    /// leaves no attempt running that could still write its target.
    async fn attempt(
        &self,
        backend: Arc<dyn Backend>,
        request: &ConversionRequest,
        name: &str,
        index: usize,
        total: usize,
    ) -> Step {
        let request = request.clone();
        let timeout = self.timeout;
        let observer = Arc::clone(&self.observer);
        let task_name = name.to_string();

        let mut handle = AbortOnDrop(tokio::spawn(async move {
            match backend.availability().await {
                Availability::Unavailable(reason) => Step::Skipped(reason),
                Availability::Available => {
                    debug!(backend = %task_name, index, "invoking backend");
                    observer.on_attempt_start(&task_name, index, total);
                    match backend.invoke(&request, timeout).await {
                        Ok(path) => Step::Converted(path),
                        Err(reason) => Step::Failed(reason),
                    }
                }
            }
        }));

        match (&mut handle.0).await {
            Ok(step) => step,
            Err(e) => {
                let detail = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    "attempt task was cancelled".to_string()
                };
                Step::Failed(FailureReason::Fault { detail })
            }
        }
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The size of the PDF at `path`, or why it does not count as output.
fn verify_output(path: &Path) -> Result<u64, FailureReason> {
    match std::fs::metadata(path) {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(m.len()),
        _ => Err(FailureReason::OutputMissingAfterSuccess {
            expected: path.to_path_buf(),
        }),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("backend panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("backend panicked: {s}")
    } else {
        "backend panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        WritePdf,
        ClaimWithoutWriting,
        Panic,
        WritePdfAfter(Duration),
    }

    struct Scripted {
        behaviour: Behaviour,
        invoked: AtomicUsize,
    }

    impl Scripted {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                invoked: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Backend for Scripted {
        async fn availability(&self) -> Availability {
            Availability::Available
        }

        async fn invoke(
            &self,
            request: &ConversionRequest,
            _timeout: Duration,
        ) -> Result<PathBuf, FailureReason> {
            self.invoked.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::WritePdf => {
                    std::fs::write(request.target(), b"%PDF-1.7 fake").unwrap();
                    Ok(std::path::absolute(request.target()).unwrap())
                }
                Behaviour::ClaimWithoutWriting => Ok(request.target().to_path_buf()),
                Behaviour::Panic => panic!("adapter bug"),
                Behaviour::WritePdfAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    std::fs::write(request.target(), b"%PDF-1.7 late").unwrap();
                    Ok(request.target().to_path_buf())
                }
            }
        }
    }

    fn request(dir: &Path) -> ConversionRequest {
        let src = dir.join("report.docx");
        std::fs::write(&src, b"PK fake").unwrap();
        ConversionRequest::new(src, dir.join("report.pdf")).unwrap()
    }

    #[tokio::test]
    async fn panic_becomes_fault_and_next_backend_runs() {
        let dir = tempfile::tempdir().unwrap();
        let good = Scripted::new(Behaviour::WritePdf);
        let registry = BackendRegistry::builder()
            .register("buggy", 0, Scripted::new(Behaviour::Panic))
            .register("good", 1, good.clone())
            .build()
            .unwrap();
        let converter = Converter::new(registry, Duration::from_secs(5));

        let outcome = converter.convert(&request(dir.path())).await;
        match outcome {
            ConversionOutcome::Success(pdf) => assert_eq!(pdf.backend, "good"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(good.invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panic_detail_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let registry = BackendRegistry::builder()
            .register("buggy", 0, Scripted::new(Behaviour::Panic))
            .build()
            .unwrap();
        let outcome = Converter::new(registry, Duration::from_secs(5))
            .convert(&request(dir.path()))
            .await;
        let attempts = outcome.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].disposition, Disposition::Failed);
        match &attempts[0].reason {
            FailureReason::Fault { detail } => assert!(detail.contains("adapter bug"), "{detail}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn claimed_success_without_file_is_not_success() {
        let dir = tempfile::tempdir().unwrap();
        let registry = BackendRegistry::builder()
            .register("liar", 0, Scripted::new(Behaviour::ClaimWithoutWriting))
            .build()
            .unwrap();
        let outcome = Converter::new(registry, Duration::from_secs(5))
            .convert(&request(dir.path()))
            .await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts()[0].reason.kind(), "output_missing_after_success");
    }

    #[tokio::test]
    async fn cancelled_caller_stops_the_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("report.docx");
        std::fs::write(&src, b"PK fake").unwrap();
        let target = dir.path().join("report.pdf");
        let slow = Scripted::new(Behaviour::WritePdfAfter(Duration::from_millis(400)));
        let registry = BackendRegistry::builder()
            .register("slow", 0, slow.clone())
            .build()
            .unwrap();
        let conv = Converter::new(registry, Duration::from_secs(5));

        let cut_short =
            tokio::time::timeout(Duration::from_millis(100), conv.convert_files(&src, &target))
                .await;
        assert!(cut_short.is_err());
        assert_eq!(slow.invoked.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(!target.exists(), "aborted attempt still wrote its output");
    }

    #[tokio::test]
    async fn empty_registry_fails_with_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Converter::new(BackendRegistry::default(), Duration::from_secs(1));
        let outcome = converter.convert(&request(dir.path())).await;
        assert_eq!(outcome, ConversionOutcome::Failure { attempts: vec![] });
    }

    #[tokio::test]
    async fn convert_files_validates_first() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Scripted::new(Behaviour::WritePdf);
        let registry = BackendRegistry::builder()
            .register("good", 0, backend.clone())
            .build()
            .unwrap();
        let converter = Converter::new(registry, Duration::from_secs(1));

        let odt = dir.path().join("notes.odt");
        std::fs::write(&odt, b"x").unwrap();
        let err = converter
            .convert_files(&odt, dir.path().join("notes.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Office2PdfError::UnsupportedExtension { .. }));
        assert_eq!(backend.invoked.load(Ordering::SeqCst), 0);

        let converter = converter.with_allowed_extensions(vec!["odt".into()]);
        let pdf = converter
            .convert_files(&odt, dir.path().join("notes.pdf"))
            .await
            .unwrap();
        assert!(pdf.output_path.is_absolute());
        assert!(pdf.byte_size > 0);
    }

    #[test]
    fn convert_sync_runs_outside_a_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let registry = BackendRegistry::builder()
            .register("good", 0, Scripted::new(Behaviour::WritePdf))
            .build()
            .unwrap();
        let converter = Converter::new(registry, Duration::from_secs(1));
        let src = dir.path().join("memo.doc");
        std::fs::write(&src, b"x").unwrap();
        let pdf = converter
            .convert_sync(&src, dir.path().join("memo.pdf"))
            .unwrap();
        assert_eq!(pdf.backend, "good");
    }

    #[test]
    fn from_config_uses_configured_order() {
        let config = ConversionConfig::builder()
            .backend_order(["word"])
            .timeout_secs(7)
            .build()
            .unwrap();
        let converter = Converter::from_config(&config).unwrap();
        assert_eq!(converter.registry().names(), vec!["word"]);
        assert_eq!(converter.timeout(), Duration::from_secs(7));
    }
}
