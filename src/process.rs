//! Run an external converter with a hard timeout.
//!
//! Converters get wedged: a modal dialog, a stale profile lock, a corrupt
//! document that sends the layout engine into a loop. Every spawn therefore
//! goes through [`run_with_timeout`], which kills the child when the ceiling
//! expires and reaps it before returning, so no converter outlives its
//! attempt.
//!
//! The `soffice` launcher does not do the work itself: it forks
//! `soffice.bin` and waits. On Unix the child therefore leads a process
//! group of its own, and a timeout (or a dropped attempt) signals the whole
//! group so the worker dies with its launcher.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Bytes of stderr kept for diagnostics.
pub const EXCERPT_BYTES: usize = 500;

/// Captured result of a process that exited on its own.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// The tail of stderr, or of stdout when stderr is empty.
    pub fn diagnostic_excerpt(&self) -> String {
        let source = if self.stderr.iter().all(u8::is_ascii_whitespace) {
            &self.stdout
        } else {
            &self.stderr
        };
        excerpt(source, EXCERPT_BYTES)
    }
}

/// Why a process run did not yield a [`ProcessOutput`].
#[derive(Debug)]
pub enum RunError {
    /// `spawn()` failed (binary vanished, not executable, ...).
    Spawn(std::io::Error),
    /// The ceiling expired; the child was killed and reaped.
    Timeout(Duration),
    /// Waiting on the child failed after it started.
    Wait(std::io::Error),
}

/// Spawn `command`, capture its output, and enforce `timeout`.
///
/// stdin is closed; stdout and stderr are piped and drained concurrently so
/// a chatty child cannot deadlock on a full pipe.
pub async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<ProcessOutput, RunError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let start = Instant::now();
    let mut child = command.spawn().map_err(RunError::Spawn)?;
    let mut group = ProcessGroup::of(&child);
    debug!(pid = child.id(), "converter process started");

    let stdout = tokio::spawn(drain(child.stdout.take()));
    let stderr = tokio::spawn(drain(child.stderr.take()));

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            // Reaped: the group id may be reused from here on.
            group.disarm();
            status
        }
        Ok(Err(e)) => return Err(RunError::Wait(e)),
        Err(_) => {
            warn!(
                pid = child.id(),
                timeout_secs = timeout.as_secs(),
                "converter timed out; killing"
            );
            group.kill();
            // kill() sends SIGKILL / TerminateProcess and waits for exit.
            if let Err(e) = child.kill().await {
                warn!("failed to kill timed-out converter: {e}");
            }
            stdout.abort();
            stderr.abort();
            return Err(RunError::Timeout(timeout));
        }
    };

    // A daemonised grandchild can hold the pipes open after the child exits;
    // don't let that stretch the attempt past its ceiling.
    let remaining = timeout
        .saturating_sub(start.elapsed())
        .max(Duration::from_secs(1));
    let aborts = (stdout.abort_handle(), stderr.abort_handle());
    let pipes = async { (stdout.await.unwrap_or_default(), stderr.await.unwrap_or_default()) };
    let (stdout, stderr) = match tokio::time::timeout(remaining, pipes).await {
        Ok(captured) => captured,
        Err(_) => {
            warn!("converter exited but its output pipes stayed open; capture truncated");
            aborts.0.abort();
            aborts.1.abort();
            (Vec::new(), Vec::new())
        }
    };
    let elapsed = start.elapsed();
    debug!(code = ?status.code(), elapsed_ms = elapsed.as_millis() as u64, "converter exited");

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        elapsed,
    })
}

/// The child's process group, killed on drop unless disarmed.
///
/// Declared after the `Child` it belongs to, so it drops first and the
/// group is signalled before tokio reaps the leader.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg takes plain integers and touches no memory.
            let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
            if rc != 0 {
                debug!(
                    pgid,
                    error = %std::io::Error::last_os_error(),
                    "process group already gone"
                );
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        // A read error just truncates the capture.
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

/// Lossy UTF-8 tail of `bytes`, at most `max` bytes, trimmed.
pub fn excerpt(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
