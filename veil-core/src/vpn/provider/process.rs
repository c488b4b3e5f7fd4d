//! Tool invocation and process teardown for process-backed providers

use crate::error::ProviderError;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Locate a system tool in PATH
pub(crate) fn locate(tool: &str) -> Result<PathBuf, ProviderError> {
    which::which(tool).map_err(|_| ProviderError::ToolMissing {
        tool: tool.to_string(),
    })
}

/// Run a tool to completion, returning its stdout
pub(crate) async fn run(program: &Path, args: &[&str]) -> Result<String, ProviderError> {
    debug!(program = %program.display(), ?args, "Running tunnel tool");

    let output = Command::new(program).args(args).output().await?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(ProviderError::CommandFailed {
        command: program.display().to_string(),
        code: output.status.code(),
        stderr,
    })
}

/// Write a file readable only by the owner
pub(crate) fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

/// Check whether a process with this PID exists
pub(crate) fn is_process_alive(pid: i32) -> bool {
    // Signal 0 probes for existence; EPERM means it exists but is not ours.
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

/// Terminate a process gracefully
///
/// Sends SIGTERM first, waits up to 5 seconds, then sends SIGKILL if still alive.
pub(crate) async fn terminate_process(pid: i32) -> Result<(), ProviderError> {
    if !is_process_alive(pid) {
        return Ok(());
    }

    kill(Pid::from_raw(pid), Signal::SIGTERM)
        .map_err(|e| ProviderError::Failed(format!("Failed to send SIGTERM to {}: {}", pid, e)))?;

    for _ in 0..10 {
        sleep(Duration::from_millis(500)).await;
        if !is_process_alive(pid) {
            return Ok(());
        }
    }

    warn!(pid, "Tunnel process ignored SIGTERM, sending SIGKILL");
    kill(Pid::from_raw(pid), Signal::SIGKILL)
        .map_err(|e| ProviderError::Failed(format!("Failed to send SIGKILL to {}: {}", pid, e)))?;

    sleep(Duration::from_millis(500)).await;

    if is_process_alive(pid) {
        Err(ProviderError::Failed(format!(
            "Process {} did not respond to signals",
            pid
        )))
    } else {
        Ok(())
    }
}
