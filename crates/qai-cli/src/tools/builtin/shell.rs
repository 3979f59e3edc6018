//! shell tool: run a command with merged output and a wall-clock limit

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::tools::{SecurityLevel, Tool, ToolContext, ToolFailure, ToolFailureKind, ToolResult};

/// Tool for executing shell commands
pub struct ShellTool;

/// Send SIGKILL to every process in the group led by `pgid`
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    // SAFETY: killpg has no memory-safety preconditions
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, "Process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Kill the command's process group and reap the shell so nothing is left
/// behind as a zombie or orphan.
async fn terminate(child: &mut Child, pgid: Option<u32>) {
    if let Some(pgid) = pgid {
        kill_process_group(pgid);
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Child already exited");
    }
    let _ = child.wait().await;
}

enum Finish {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

fn describe_status(status: std::process::ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    if let Some(code) = status.code() {
        return Some(format!("[exit status: {}]", code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(format!("[terminated by signal {}]", signal));
        }
    }
    Some("[exit status: unknown]".to_string())
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command in the project directory and return its combined stdout and stderr. A non-zero exit status is reported alongside the output."
    }

    fn input_format(&self) -> &str {
        "<command>"
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        let command = input.trim();
        if command.is_empty() {
            return Err(ToolFailure::invalid_input("expected a command"));
        }
        if !ctx.working_dir.is_dir() {
            return Err(ToolFailure::new(
                ToolFailureKind::NotFound,
                format!("working directory does not exist: {}", ctx.working_dir.display()),
            ));
        }

        // `exec 2>&1` interleaves stderr into the stdout pipe in write order
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("exec 2>&1\n{}", command))
            .current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            ToolFailure::new(ToolFailureKind::ProcessSpawnFailure, format!("failed to start sh: {}", e))
        })?;
        let pgid = child.id();
        debug!(pid = ?pgid, timeout_secs = ctx.command_timeout.as_secs(), "Command started");

        let mut stdout = child.stdout.take();
        let reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        });

        let finish = tokio::select! {
            status = child.wait() => Finish::Exited(status),
            _ = tokio::time::sleep(ctx.command_timeout) => Finish::TimedOut,
            _ = ctx.cancel.cancelled() => Finish::Cancelled,
        };

        let status = match finish {
            Finish::Exited(status) => {
                // Background jobs still holding the pipe are part of the command
                if let Some(pgid) = pgid {
                    kill_process_group(pgid);
                }
                status
            }
            Finish::Cancelled => {
                terminate(&mut child, pgid).await;
                reader.abort();
                return Err(ToolFailure::new(ToolFailureKind::Cancelled, "command killed on user cancel"));
            }
            Finish::TimedOut => {
                warn!(command = %command, "Command timed out");
                terminate(&mut child, pgid).await;
                let partial = collect_output(reader).await;
                let mut detail = format!("command timed out after {:.1}s", ctx.command_timeout.as_secs_f64());
                if !partial.trim().is_empty() {
                    detail.push_str("\npartial output:\n");
                    detail.push_str(partial.trim_end());
                }
                return Err(ToolFailure::new(ToolFailureKind::Timeout, detail));
            }
        };

        let status = status.map_err(|e| ToolFailure::new(ToolFailureKind::Io, format!("failed to wait for command: {}", e)))?;
        let output = collect_output(reader).await;

        let mut observation = if output.trim().is_empty() {
            "(no output)".to_string()
        } else {
            output.trim_end().to_string()
        };
        if let Some(status_line) = describe_status(status) {
            observation.push('\n');
            observation.push_str(&status_line);
        }
        Ok(observation)
    }
}

async fn collect_output(reader: tokio::task::JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(std::time::Duration::from_secs(2), reader).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        _ => String::new(),
    }
}
