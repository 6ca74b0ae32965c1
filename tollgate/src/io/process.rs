//! Helpers for running child processes with cancellation and bounded output.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::GateError;
use crate::io::cancel::CancelToken;

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// How often a waiting child is checked against the cancel token.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Stdout followed by stderr, with truncation notices, trailing newline trimmed.
    pub fn combined(&self) -> String {
        let mut buf = String::from_utf8_lossy(&self.stdout).to_string();
        if self.stdout_truncated > 0 {
            buf.push_str(&format!("\n[stdout truncated {} bytes]\n", self.stdout_truncated));
        }
        buf.push_str(&String::from_utf8_lossy(&self.stderr));
        if self.stderr_truncated > 0 {
            buf.push_str(&format!("\n[stderr truncated {} bytes]\n", self.stderr_truncated));
        }
        buf.trim_end_matches('\n').to_string()
    }
}

/// Render a command as `program arg1 arg2` for messages.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|arg| arg.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Run a command to completion, capturing stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// When `cancel` fires the child's whole process group is killed and
/// [`GateError::Cancelled`] is returned without waiting for the output readers.
#[instrument(skip_all, fields(command = %describe(&cmd)))]
pub fn run_command(
    mut cmd: Command,
    cancel: &CancelToken,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cancel.check()?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group, so cancellation reaches wrappers' children too.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {}", describe(&cmd)));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let status = loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL).context("wait for command")? {
            break status;
        }
        if cancel.is_cancelled() {
            warn!("run cancelled, killing child process group");
            kill_tree(&mut child)?;
            child.wait().context("wait command after kill")?;
            // Readers may still be blocked on a pipe held by an escaped
            // descendant; leave them detached.
            return Err(GateError::Cancelled.into());
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    })
}

/// Like [`run_command`], but a non-zero exit becomes [`GateError::ExternalTool`]
/// carrying the captured output.
pub fn run_checked(
    cmd: Command,
    cancel: &CancelToken,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let command = describe(&cmd);
    let output = run_command(cmd, cancel, output_limit_bytes)?;
    if !output.status.success() {
        warn!(command = %command, exit_code = ?output.status.code(), "command failed");
        return Err(GateError::ExternalTool {
            command,
            status: output.status.to_string(),
            output: output.combined(),
        }
        .into());
    }
    Ok(output)
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno).context("kill command process group"),
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let out = run_command(sh("echo out; echo err >&2"), &CancelToken::new(), 1000)
            .expect("run");
        assert!(out.status.success());
        assert_eq!(out.combined(), "out\nerr");
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_command(sh("printf 0123456789"), &CancelToken::new(), 4).expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
        assert!(out.combined().contains("[stdout truncated 6 bytes]"));
    }

    #[test]
    fn non_zero_exit_is_external_tool_error() {
        let err = run_checked(sh("echo broken; exit 3"), &CancelToken::new(), 1000).unwrap_err();
        match err.downcast_ref::<GateError>() {
            Some(GateError::ExternalTool { command, output, .. }) => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(output, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancelled_token_refuses_to_spawn() {
        let token = CancelToken::new();
        token.cancel();
        let err = run_command(sh("true"), &token, 1000).unwrap_err();
        assert!(GateError::is_cancelled(&err));
    }

    #[test]
    fn deadline_kills_running_child() {
        let token = CancelToken::new().with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = run_command(sh("sleep 30"), &token, 1000).unwrap_err();
        assert!(GateError::is_cancelled(&err));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn deadline_kills_grandchildren_of_a_shell_wrapper() {
        let token = CancelToken::new().with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = run_command(sh("sleep 30; true"), &token, 1000).unwrap_err();
        assert!(GateError::is_cancelled(&err));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn deadline_does_not_wait_for_detached_pipe_holders() {
        let token = CancelToken::new().with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        // setsid moves the sleeper out of the group while it keeps stdout open.
        let err = run_command(
            sh("if command -v setsid >/dev/null; then setsid sleep 5 & fi; sleep 30"),
            &token,
            1000,
        )
        .unwrap_err();
        assert!(GateError::is_cancelled(&err));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
