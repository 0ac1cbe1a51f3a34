//! Microsoft Word adapter.
//!
//! Word exposes its document model only through the platform automation
//! layer: Apple Events on macOS, COM on Windows. Rather than binding either
//! API directly, the adapter hands a fixed script to the platform's own
//! automation host (`osascript`, PowerShell) and passes the document paths
//! as arguments / environment variables, never spliced into script text.
//!
//! On Linux and other Unix systems the adapter is permanently unavailable.

use super::{Availability, Backend};
use crate::error::FailureReason;
use crate::process::{run_with_timeout, RunError};
use crate::request::ConversionRequest;
use async_trait::async_trait;
use office_locate::{Locator, Platform, Tool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Registry name of this adapter.
pub const NAME: &str = "word";

/// AppleScript run by `osascript`; argv is `[source, target]`.
const APPLESCRIPT: &[&str] = &[
    "on run argv",
    "set inPath to item 1 of argv",
    "set outPath to item 2 of argv",
    "tell application \"Microsoft Word\"",
    "open (POSIX file inPath)",
    "set theDoc to active document",
    "save as theDoc file name outPath file format format PDF",
    "close theDoc saving no",
    "end tell",
    "end run",
];

/// PowerShell COM script; paths arrive in `OFFICE2PDF_SOURCE` / `OFFICE2PDF_TARGET`.
const POWERSHELL: &str = r#"$ErrorActionPreference = 'Stop'
$word = New-Object -ComObject Word.Application
$word.Visible = $false
$word.DisplayAlerts = 0
try {
    $doc = $word.Documents.Open($env:OFFICE2PDF_SOURCE, $false, $true)
    try {
        $out = $env:OFFICE2PDF_TARGET
        $doc.SaveAs([ref]$out, [ref]17)
    } finally {
        $doc.Close([ref]0)
    }
} finally {
    $word.Quit()
    [void][System.Runtime.InteropServices.Marshal]::ReleaseComObject($word)
}
"#;

/// Which automation host drives Word on a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Host {
    AppleScript,
    PowerShell,
}

fn host_for(platform: Platform) -> Option<Host> {
    match platform {
        Platform::MacOs => Some(Host::AppleScript),
        Platform::Windows => Some(Host::PowerShell),
        Platform::Unix => None,
    }
}

/// Converts through Microsoft Word's own PDF export.
pub struct NativeWordBackend {
    locator: Arc<Locator>,
    lock: Mutex<()>,
}

impl NativeWordBackend {
    pub fn new(locator: Arc<Locator>) -> Self {
        Self {
            locator,
            lock: Mutex::new(()),
        }
    }

    /// The host and its executable, or why Word cannot be driven here.
    fn resolve(&self) -> Result<(Host, PathBuf), FailureReason> {
        let platform = self.locator.platform();
        let host = host_for(platform).ok_or_else(|| FailureReason::EngineUnavailable {
            detail: format!("no Word automation layer on {platform}"),
        })?;
        if !self.locator.locate(Tool::Word).is_found() {
            return Err(FailureReason::EngineUnavailable {
                detail: "Microsoft Word is not installed".to_string(),
            });
        }
        let exe = self
            .locator
            .locate(Tool::AutomationHost)
            .path()
            .map(Path::to_path_buf)
            .ok_or_else(|| FailureReason::EngineUnavailable {
                detail: format!("automation host ({}) not found", host_label(host)),
            })?;
        Ok((host, exe))
    }
}

fn host_label(host: Host) -> &'static str {
    match host {
        Host::AppleScript => "osascript",
        Host::PowerShell => "powershell",
    }
}

fn command(host: Host, exe: &Path, source: &Path, target: &Path) -> Command {
    let mut cmd = Command::new(exe);
    match host {
        Host::AppleScript => {
            for line in APPLESCRIPT {
                cmd.arg("-e").arg(line);
            }
            cmd.arg(source).arg(target);
        }
        Host::PowerShell => {
            cmd.args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                POWERSHELL,
            ])
            .env("OFFICE2PDF_SOURCE", source)
            .env("OFFICE2PDF_TARGET", target);
        }
    }
    cmd
}

#[async_trait]
impl Backend for NativeWordBackend {
    async fn availability(&self) -> Availability {
        match self.resolve() {
            Ok(_) => Availability::Available,
            Err(reason) => Availability::Unavailable(reason),
        }
    }

    async fn invoke(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<PathBuf, FailureReason> {
        let (host, exe) = self.resolve()?;

        // Word resolves relative paths against its own working directory.
        let source = absolute(request.source());
        let target = absolute(request.target());

        // A stale file at the target would look like success.
        if tokio::fs::metadata(&target).await.is_ok() {
            tokio::fs::remove_file(&target)
                .await
                .map_err(|e| FailureReason::Io {
                    detail: format!("removing stale {}: {e}", target.display()),
                })?;
        }

        let queued = Instant::now();
        let _guard = self.lock.lock().await;
        debug!(
            host = host_label(host),
            source = %source.display(),
            waited_ms = queued.elapsed().as_millis() as u64,
            "driving Microsoft Word"
        );

        let output = run_with_timeout(command(host, &exe, &source, &target), timeout)
            .await
            .map_err(|e| match e {
                RunError::Timeout(t) => FailureReason::Timeout { secs: t.as_secs() },
                RunError::Spawn(e) | RunError::Wait(e) => FailureReason::EngineError {
                    detail: format!("{}: {e}", exe.display()),
                },
            })?;

        if !output.status.success() {
            return Err(FailureReason::EngineError {
                detail: output.diagnostic_excerpt(),
            });
        }

        let written = tokio::fs::metadata(&target)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(FailureReason::EngineError {
                detail: format!("Word finished but wrote no PDF at {}", target.display()),
            });
        }

        info!(output = %target.display(), "Word conversion finished");
        Ok(target)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use office_locate::{Candidate, CandidateTable};

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn unavailable_on_plain_unix() {
        let locator = Arc::new(
            Locator::new(CandidateTable::builtin()).with_platform(Platform::Unix),
        );
        let backend = NativeWordBackend::new(locator);
        match backend.availability().await {
            Availability::Unavailable(FailureReason::EngineUnavailable { detail }) => {
                assert!(detail.contains("unix"), "got: {detail}")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unavailable_without_word_install() {
        let locator = Arc::new(
            Locator::new(CandidateTable::empty().with(
                Platform::MacOs,
                Tool::AutomationHost,
                vec![Candidate::Command("osascript".into())],
            ))
            .with_platform(Platform::MacOs)
            .with_search_path(None),
        );
        let backend = NativeWordBackend::new(locator);
        assert_eq!(
            backend.availability().await,
            Availability::Unavailable(FailureReason::EngineUnavailable {
                detail: "Microsoft Word is not installed".into()
            })
        );
    }

    #[tokio::test]
    async fn invoke_when_unavailable_is_typed_failure() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("report.docx");
        std::fs::write(&src, b"doc").unwrap();
        let request = ConversionRequest::new(&src, dir.path().join("report.pdf")).unwrap();

        let locator = Arc::new(Locator::new(CandidateTable::empty()).with_platform(Platform::Unix));
        let err = NativeWordBackend::new(locator)
            .invoke(&request, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "engine_unavailable");
    }

    #[test]
    fn applescript_receives_paths_as_argv() {
        let cmd = command(
            Host::AppleScript,
            Path::new("/usr/bin/osascript"),
            Path::new("/up/it's \"quoted\".docx"),
            Path::new("/out/report.pdf"),
        );
        let args = args(&cmd);
        assert_eq!(args.len(), APPLESCRIPT.len() * 2 + 2);
        assert_eq!(args[args.len() - 2], "/up/it's \"quoted\".docx");
        assert_eq!(args[args.len() - 1], "/out/report.pdf");
        assert!(args.iter().filter(|a| a.contains("quoted")).count() == 1);
    }

    #[test]
    fn powershell_receives_paths_through_env() {
        let cmd = command(
            Host::PowerShell,
            Path::new("powershell.exe"),
            Path::new(r"C:\up\report.docx"),
            Path::new(r"C:\out\report.pdf"),
        );
        assert!(args(&cmd).iter().all(|a| !a.contains("report")));
        let envs: Vec<_> = cmd
            .as_std()
            .get_envs()
            .map(|(k, v)| (k.to_string_lossy().into_owned(), v.map(|v| v.to_string_lossy().into_owned())))
            .collect();
        assert!(envs.contains(&("OFFICE2PDF_SOURCE".into(), Some(r"C:\up\report.docx".into()))));
        assert!(envs.contains(&("OFFICE2PDF_TARGET".into(), Some(r"C:\out\report.pdf".into()))));
    }
}
