//! Headless LibreOffice adapter.
//!
//! ## How a conversion runs
//!
//! ```text
//! lock ─▶ mkdir <target dir>/.office2pdf-XXXX ─▶ soffice --headless --convert-to pdf
//!      ─▶ find <stem>.pdf ─▶ rename to target ─▶ staging dir removed
//! ```
//!
//! `soffice --convert-to` always names its output after the input's stem,
//! whatever the caller asked for. Converting into a private staging
//! directory next to the target keeps that name from colliding with other
//! files (or with concurrent conversions of a same-named upload) and keeps
//! the final rename on one filesystem, hence atomic.
//!
//! LibreOffice refuses to start without a writable `$HOME` for its user
//! profile, which service accounts often lack, so `HOME` is pointed at a
//! dedicated profile directory. One profile admits one running instance:
//! invocations through the same adapter are serialised by an async mutex.

use super::{Availability, Backend};
use crate::error::FailureReason;
use crate::process::{run_with_timeout, RunError};
use crate::request::ConversionRequest;
use async_trait::async_trait;
use office_locate::{Locator, Tool};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Registry name of this adapter.
pub const NAME: &str = "soffice";

/// Flags for a silent, non-interactive, no-restore PDF export.
const CONVERT_FLAGS: &[&str] = &["--headless", "--convert-to", "pdf"];
const SESSION_FLAGS: &[&str] = &["--norestore", "--nofirststartwizard", "--nologo"];

/// `convert /in/report.docx -> /out/report.pdf using filter : writer_pdf_Export`
static CONVERT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^convert .+? -> (.+?) using filter").unwrap()
});

/// Drives `soffice --headless --convert-to pdf`.
pub struct SofficeBackend {
    locator: Arc<Locator>,
    profile_dir: PathBuf,
    lock: Mutex<()>,
}

impl SofficeBackend {
    pub fn new(locator: Arc<Locator>, profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            locator,
            profile_dir: profile_dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn binary(&self) -> Option<PathBuf> {
        self.locator
            .locate(Tool::Soffice)
            .path()
            .map(Path::to_path_buf)
    }

    fn command(&self, binary: &Path, source: &Path, outdir: &Path) -> Command {
        let mut cmd = Command::new(binary);
        cmd.args(CONVERT_FLAGS)
            .arg("--outdir")
            .arg(outdir)
            .args(SESSION_FLAGS)
            .arg(source)
            .env("HOME", &self.profile_dir);
        cmd
    }
}

#[async_trait]
impl Backend for SofficeBackend {
    async fn availability(&self) -> Availability {
        match self.binary() {
            Some(_) => Availability::Available,
            None => Availability::Unavailable(not_found()),
        }
    }

    async fn invoke(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<PathBuf, FailureReason> {
        let binary = self.binary().ok_or_else(not_found)?;

        tokio::fs::create_dir_all(&self.profile_dir)
            .await
            .map_err(|e| FailureReason::Io {
                detail: format!("profile dir {}: {e}", self.profile_dir.display()),
            })?;

        let staging = tempfile::Builder::new()
            .prefix(".office2pdf-")
            .tempdir_in(request.target_dir())
            .map_err(|e| FailureReason::Io {
                detail: format!("staging dir in {}: {e}", request.target_dir().display()),
            })?;

        // The ceiling covers the run, not the queue; log the wait separately.
        let queued = Instant::now();
        let _guard = self.lock.lock().await;
        let waited_ms = queued.elapsed().as_millis() as u64;
        debug!(
            binary = %binary.display(),
            waited_ms,
            source = %request.source().display(),
            outdir = %staging.path().display(),
            "running soffice"
        );

        let cmd = self.command(&binary, request.source(), staging.path());
        let output = run_with_timeout(cmd, timeout)
            .await
            .map_err(|e| match e {
                RunError::Timeout(t) => FailureReason::Timeout { secs: t.as_secs() },
                RunError::Spawn(e) if e.kind() == std::io::ErrorKind::NotFound => not_found(),
                RunError::Spawn(e) => FailureReason::SpawnFailed {
                    detail: format!("{}: {e}", binary.display()),
                },
                RunError::Wait(e) => FailureReason::SpawnFailed {
                    detail: format!("waiting on {}: {e}", binary.display()),
                },
            })?;

        if !output.status.success() {
            return Err(FailureReason::ProcessNonZeroExit {
                code: output.status.code(),
                stderr_excerpt: output.diagnostic_excerpt(),
            });
        }

        let expected = expected_output(staging.path(), request.source());
        let produced = reported_output(&output.stdout_lossy(), staging.path())
            .filter(|p| non_empty_file(p))
            .unwrap_or_else(|| expected.clone());

        if !non_empty_file(&produced) {
            warn!(
                expected = %expected.display(),
                stdout = %output.stdout_lossy().trim(),
                "soffice exited 0 without writing a PDF"
            );
            return Err(FailureReason::OutputMissingAfterSuccess { expected });
        }

        tokio::fs::rename(&produced, request.target())
            .await
            .map_err(|e| FailureReason::Io {
                detail: format!(
                    "moving {} to {}: {e}",
                    produced.display(),
                    request.target().display()
                ),
            })?;

        info!(
            output = %request.target().display(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "soffice conversion finished"
        );
        Ok(request.target().to_path_buf())
    }
}

fn not_found() -> FailureReason {
    FailureReason::BinaryNotFound {
        tool: NAME.to_string(),
    }
}

/// `<outdir>/<source stem>.pdf`, the name soffice always writes.
pub fn expected_output(outdir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    outdir.join(format!("{stem}.pdf"))
}

/// The output path soffice printed, if it printed one inside `outdir`.
fn reported_output(stdout: &str, outdir: &Path) -> Option<PathBuf> {
    CONVERT_LINE
        .captures_iter(stdout)
        .filter_map(|c| c.get(1))
        .map(|m| PathBuf::from(m.as_str().trim()))
        .find(|p| p.parent().map(|d| same_dir(d, outdir)).unwrap_or(false))
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use office_locate::{Candidate, CandidateTable, Platform};

    #[test]
    fn expected_output_uses_source_stem() {
        assert_eq!(
            expected_output(Path::new("/tmp/stage"), Path::new("/up/1234_report.final.docx")),
            PathBuf::from("/tmp/stage/1234_report.final.pdf")
        );
    }

    #[test]
    fn reported_output_parses_convert_line() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.pdf");
        let stdout = format!(
            "convert /up/report.docx -> {} using filter : writer_pdf_Export\n",
            out.display()
        );
        assert_eq!(reported_output(&stdout, dir.path()), Some(out));
    }

    #[test]
    fn reported_output_outside_outdir_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let stdout = "convert /up/report.docx -> /elsewhere/report.pdf using filter : writer_pdf_Export";
        assert_eq!(reported_output(stdout, dir.path()), None);
        assert_eq!(reported_output("", dir.path()), None);
    }

    #[test]
    fn command_line_has_headless_flags() {
        let locator = Arc::new(Locator::new(CandidateTable::empty()));
        let backend = SofficeBackend::new(locator, "/var/lib/office2pdf");
        let cmd = backend.command(
            Path::new("/usr/bin/soffice"),
            Path::new("/up/report.docx"),
            Path::new("/out/.office2pdf-x"),
        );
        let std_cmd = cmd.as_std();
        let args: Vec<String> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--headless",
                "--convert-to",
                "pdf",
                "--outdir",
                "/out/.office2pdf-x",
                "--norestore",
                "--nofirststartwizard",
                "--nologo",
                "/up/report.docx",
            ]
        );
        let home = std_cmd
            .get_envs()
            .find(|(k, _)| *k == "HOME")
            .and_then(|(_, v)| v);
        assert_eq!(home, Some(std::ffi::OsStr::new("/var/lib/office2pdf")));
    }

    #[tokio::test]
    async fn unavailable_without_binary() {
        let table = CandidateTable::empty().with(
            Platform::current(),
            Tool::Soffice,
            vec![Candidate::Path(PathBuf::from("/no/such/soffice"))],
        );
        let locator = Arc::new(Locator::new(table).with_search_path(None));
        let backend = SofficeBackend::new(locator, std::env::temp_dir());
        assert_eq!(backend.availability().await, Availability::Unavailable(not_found()));
    }

    #[tokio::test]
    async fn invoke_without_binary_is_typed_failure() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("report.docx");
        std::fs::write(&src, b"doc").unwrap();
        let request = ConversionRequest::new(&src, dir.path().join("report.pdf")).unwrap();

        let locator = Arc::new(Locator::new(CandidateTable::empty()).with_search_path(None));
        let backend = SofficeBackend::new(locator, dir.path().join("home"));
        let err = backend
            .invoke(&request, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, not_found());
    }
}
