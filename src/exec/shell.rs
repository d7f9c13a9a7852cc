use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::error::ExecError;

/// How long output readers may keep draining after the shell exits.
/// A backgrounded child that inherited the pipes would otherwise hold them open.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Result of a shell command execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ExecResult {
    /// Render the result the way the `execute` tool reports it: stdout, then
    /// a `STDERR:` block, then a non-zero `EXIT CODE:`; trimmed, with a
    /// placeholder when everything is empty.
    pub fn to_tool_output(&self, timeout_secs: u64) -> String {
        if self.timed_out {
            return format!(
                "ERROR: Command timed out after {} seconds. Use nohup for long-running processes.",
                timeout_secs
            );
        }

        let mut output = self.stdout.clone();
        if !self.stderr.is_empty() {
            output.push_str("\nSTDERR:\n");
            output.push_str(&self.stderr);
        }
        match self.exit_code {
            Some(0) => {}
            Some(code) => output.push_str(&format!("\nEXIT CODE: {}", code)),
            None => output.push_str("\nEXIT CODE: signal"),
        }

        let trimmed = output.trim();
        if trimmed.is_empty() {
            "(no output)".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Which process group a shell command runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessGroup {
    /// A new group led by the shell. A timeout kills the whole group.
    #[default]
    Own,
    /// The caller's group, so a kill aimed at the caller's group reaches the
    /// command as well. A timeout kills only the shell.
    Inherited,
}

/// Run `sh -c <command>` in `cwd` with a hard wall-clock timeout.
///
/// The shell is placed in its own process group so that on expiry the whole
/// group (the shell and anything it started) is killed with SIGKILL. A timed
/// out run reports `timed_out: true` and no exit code.
pub async fn execute_shell(
    command: &str,
    cwd: &Path,
    timeout_secs: u64,
) -> anyhow::Result<ExecResult> {
    execute_shell_in(command, cwd, timeout_secs, ProcessGroup::Own).await
}

/// [`execute_shell`] with an explicit process group.
pub async fn execute_shell_in(
    command: &str,
    cwd: &Path,
    timeout_secs: u64,
    group: ProcessGroup,
) -> anyhow::Result<ExecResult> {
    #[allow(unused_imports)]
    use std::os::unix::process::CommandExt;

    let mut shell = Command::new("sh");
    shell
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if group == ProcessGroup::Own {
        shell.process_group(0);
    }
    let mut child = shell
        .spawn()
        .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

    let pid = child.id();
    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let stdout_reader = child
        .stdout
        .take()
        .map(|out| tokio::spawn(drain_into(out, stdout_buf.clone())));
    let stderr_reader = child
        .stderr
        .take()
        .map(|err| tokio::spawn(drain_into(err, stderr_buf.clone())));

    let waited = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await;

    let (exit_code, timed_out) = match waited {
        Ok(Ok(status)) => (status.code(), false),
        Ok(Err(e)) => {
            stop(&mut child, pid, group);
            return Err(ExecError::ProcessFailed(e.to_string()).into());
        }
        Err(_) => {
            tracing::warn!(timeout_secs, "Command timed out, killing it: {}", command);
            stop(&mut child, pid, group);
            let _ = child.wait().await;
            (None, true)
        }
    };

    for reader in [stdout_reader, stderr_reader].into_iter().flatten() {
        let abort = reader.abort_handle();
        if tokio::time::timeout(READER_GRACE, reader).await.is_err() {
            abort.abort();
        }
    }

    Ok(ExecResult {
        stdout: take_lossy(&stdout_buf),
        stderr: take_lossy(&stderr_buf),
        exit_code,
        timed_out,
    })
}

/// Send SIGKILL to the process group led by `pid`. Errors (already exited,
/// no such group) are ignored.
pub fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        let pgid = nix::unistd::Pid::from_raw(pid as i32);
        let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
    }
}

fn stop(child: &mut Child, pid: Option<u32>, group: ProcessGroup) {
    match group {
        ProcessGroup::Own => kill_process_group(pid),
        ProcessGroup::Inherited => {
            let _ = child.start_kill();
        }
    }
}

async fn drain_into<R: AsyncRead + Unpin>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Ok(mut buf) = buf.lock() {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
}

fn take_lossy(buf: &Mutex<Vec<u8>>) -> String {
    match buf.lock() {
        Ok(mut bytes) => String::from_utf8_lossy(&std::mem::take(&mut *bytes)).into_owned(),
        Err(_) => String::new(),
    }
}
