//! Blocking external tool invocation with an optional deadline.

use crate::result::{RasterproofError, RasterproofResult};
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a finished tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit status
    pub status: ExitStatus,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool exited with status 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Whole seconds, rounded up so sub-second limits never read as 0s
fn ceil_secs(limit: Duration) -> u64 {
    limit.as_secs() + u64::from(limit.subsec_nanos() > 0)
}

/// Run `command` to completion, capturing stdout and stderr.
///
/// With a `timeout` the child is killed once the deadline passes and
/// `Timeout` is returned. A non-zero exit is NOT an error here; callers
/// inspect [`ToolOutput::status`].
///
/// # Errors
///
/// Returns `Io` if the tool cannot be spawned, `Timeout` on expiry
pub fn run_tool(
    mut command: Command,
    tool: &str,
    timeout: Option<Duration>,
) -> RasterproofResult<ToolOutput> {
    tracing::debug!(tool, command = ?command, "running external tool");

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            std::io::Error::new(e.kind(), format!("failed to execute {tool}: {e}"))
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                tracing::error!(tool, limit_ms = limit.as_millis(), "external tool timed out");
                return Err(RasterproofError::Timeout {
                    tool: tool.to_string(),
                    seconds: ceil_secs(limit),
                });
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    tracing::debug!(tool, %status, elapsed_ms = started.elapsed().as_millis(), "tool finished");

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}
