//! git tools: status, diff, log, add, commit
//!
//! Each subcommand is registered as its own tool so the model addresses it
//! by name (`git_status`, `git_commit`, ...). All of them run in the session
//! working directory.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::tools::{SecurityLevel, Tool, ToolContext, ToolFailure, ToolFailureKind, ToolResult};

/// Default and maximum number of `git_log` entries
const LOG_DEFAULT: usize = 10;
const LOG_MAX: usize = 50;

/// Which git subcommand a [`GitTool`] wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitCommand {
    Status,
    Diff,
    Log,
    Add,
    Commit,
}

/// Output of a finished git process
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn combined(&self) -> String {
        let mut text = self.stdout.trim_end().to_string();
        let stderr = self.stderr.trim_end();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr);
        }
        text
    }
}

/// Tool wrapping one git subcommand
pub struct GitTool {
    command: GitCommand,
}

impl GitTool {
    pub fn new(command: GitCommand) -> Self {
        Self { command }
    }

    /// Execute a git command and capture its output
    async fn run_git(&self, args: &[&str], working_dir: &Path, ctx: &ToolContext) -> Result<GitOutput, ToolFailure> {
        debug!(args = ?args, dir = %working_dir.display(), "Running git command");

        let child = Command::new("git")
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(ctx.command_timeout, child)
            .await
            .map_err(|_| {
                ToolFailure::new(
                    ToolFailureKind::Timeout,
                    format!("git {} timed out", args.first().copied().unwrap_or_default()),
                )
            })?
            .map_err(|e| ToolFailure::new(ToolFailureKind::ProcessSpawnFailure, format!("failed to run git: {}", e)))?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Fail with `VcsNotPresent` unless git is installed and `dir` is inside
    /// a work tree.
    async fn ensure_repo(&self, dir: &Path, ctx: &ToolContext) -> Result<(), ToolFailure> {
        if which::which("git").is_err() {
            return Err(ToolFailure::new(ToolFailureKind::VcsNotPresent, "git is not installed"));
        }
        let probe = self.run_git(&["rev-parse", "--is-inside-work-tree"], dir, ctx).await?;
        if !probe.success || probe.stdout.trim() != "true" {
            return Err(ToolFailure::new(
                ToolFailureKind::VcsNotPresent,
                format!("{} is not inside a git repository", dir.display()),
            ));
        }
        Ok(())
    }

    fn failed(&self, output: &GitOutput) -> ToolFailure {
        ToolFailure::new(ToolFailureKind::Io, output.combined())
    }

    async fn status(&self, input: &str, dir: &Path, ctx: &ToolContext) -> ToolResult {
        let paths = operands(input)?;
        let branch = self.run_git(&["branch", "--show-current"], dir, ctx).await?;
        let mut args = vec!["status", "--short", "--"];
        args.extend(paths.iter().copied());
        let status = self.run_git(&args, dir, ctx).await?;
        if !status.success {
            return Err(self.failed(&status));
        }

        let branch = branch.stdout.trim();
        let mut output = format!("Branch: {}\n", if branch.is_empty() { "(detached)" } else { branch });
        if status.stdout.trim().is_empty() {
            output.push_str("Working tree clean");
        } else {
            output.push_str("\nChanges:\n");
            output.push_str(status.stdout.trim_end());
        }
        Ok(output)
    }

    async fn diff(&self, input: &str, dir: &Path, ctx: &ToolContext) -> ToolResult {
        // Existing paths go after `--`; anything else is a revision
        let (paths, revs): (Vec<&str>, Vec<&str>) =
            operands(input)?.into_iter().partition(|arg| dir.join(arg).exists());
        let mut args = vec!["diff", "--color=never"];
        args.extend(revs);
        args.push("--");
        args.extend(paths);
        let diff = self.run_git(&args, dir, ctx).await?;
        if !diff.success {
            return Err(self.failed(&diff));
        }
        if diff.stdout.trim().is_empty() {
            Ok("No changes".to_string())
        } else {
            Ok(diff.stdout.trim_end().to_string())
        }
    }

    async fn log(&self, input: &str, dir: &Path, ctx: &ToolContext) -> ToolResult {
        let count = parse_log_count(input)?;
        let count_arg = format!("-{}", count);
        let log = self
            .run_git(&["log", "--oneline", "--decorate", "--color=never", &count_arg], dir, ctx)
            .await?;
        if !log.success {
            return Err(self.failed(&log));
        }
        Ok(log.stdout.trim_end().to_string())
    }

    async fn add(&self, input: &str, dir: &Path, ctx: &ToolContext) -> ToolResult {
        let paths: Vec<&str> = input.split_whitespace().collect();
        if paths.is_empty() {
            return Err(ToolFailure::invalid_input("provide path(s) to stage, e.g. '.' or 'src/main.rs'"));
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().copied());
        let add = self.run_git(&args, dir, ctx).await?;
        if !add.success {
            return Err(self.failed(&add));
        }
        Ok(format!("Staged: {}", paths.join(" ")))
    }

    async fn commit(&self, input: &str, dir: &Path, ctx: &ToolContext) -> ToolResult {
        let message = input.trim();
        if message.is_empty() {
            return Err(ToolFailure::invalid_input("commit message must not be empty"));
        }
        let commit = self.run_git(&["commit", "-m", message], dir, ctx).await?;
        if commit.success {
            return Ok(commit.stdout.trim_end().to_string());
        }
        let text = commit.combined();
        if text.contains("nothing to commit") || text.contains("no changes added to commit") {
            Err(ToolFailure::new(ToolFailureKind::NothingToCommit, text))
        } else {
            Err(ToolFailure::new(ToolFailureKind::Io, text))
        }
    }
}

/// Whitespace-separated operands. Options are refused so the model cannot
/// reach flags such as `--output`.
fn operands(input: &str) -> Result<Vec<&str>, ToolFailure> {
    let args: Vec<&str> = input.split_whitespace().collect();
    if let Some(flag) = args.iter().find(|arg| arg.starts_with('-')) {
        return Err(ToolFailure::invalid_input(format!("options are not accepted: '{}'", flag)));
    }
    Ok(args)
}

/// Entry count for `git_log`: empty means the default, capped at the max
fn parse_log_count(input: &str) -> Result<usize, ToolFailure> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(LOG_DEFAULT);
    }
    let count: usize = trimmed
        .parse()
        .map_err(|_| ToolFailure::invalid_input(format!("expected an entry count, got '{}'", trimmed)))?;
    Ok(count.clamp(1, LOG_MAX))
}

#[async_trait]
impl Tool for GitTool {
    fn name(&self) -> &str {
        match self.command {
            GitCommand::Status => "git_status",
            GitCommand::Diff => "git_diff",
            GitCommand::Log => "git_log",
            GitCommand::Add => "git_add",
            GitCommand::Commit => "git_commit",
        }
    }

    fn description(&self) -> &str {
        match self.command {
            GitCommand::Status => "Show the current branch and the short working tree status, optionally for given paths.",
            GitCommand::Diff => "Show unstaged changes, optionally limited to paths or compared against a ref.",
            GitCommand::Log => "Show recent commits, one line each (default 10, at most 50).",
            GitCommand::Add => "Stage the given whitespace-separated paths.",
            GitCommand::Commit => "Commit the staged changes with the given message.",
        }
    }

    fn input_format(&self) -> &str {
        match self.command {
            GitCommand::Status => "[path...]",
            GitCommand::Diff => "[ref] [path...]",
            GitCommand::Log => "[count]",
            GitCommand::Add => "<path> [path...]",
            GitCommand::Commit => "<message>",
        }
    }

    fn security_level(&self) -> SecurityLevel {
        match self.command {
            GitCommand::Status | GitCommand::Diff | GitCommand::Log => SecurityLevel::Safe,
            GitCommand::Add | GitCommand::Commit => SecurityLevel::Moderate,
        }
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        let dir = ctx.working_dir.as_path();
        self.ensure_repo(dir, ctx).await?;

        match self.command {
            GitCommand::Status => self.status(input, dir, ctx).await,
            GitCommand::Diff => self.diff(input, dir, ctx).await,
            GitCommand::Log => self.log(input, dir, ctx).await,
            GitCommand::Add => self.add(input, dir, ctx).await,
            GitCommand::Commit => self.commit(input, dir, ctx).await,
        }
    }
}
