//! Tool framework for the ReAct loop
//!
//! Tools take the raw text the model placed between `<tool name="...">` and
//! `</tool>` and return text for the next observation. Failures are values,
//! never panics or loop-aborting errors: the loop folds them into the
//! conversation so the model can react.

pub mod builtin;
pub mod registry;
pub mod router;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Security classification for tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Read-only operations
    Safe,
    /// Network access or VCS metadata changes
    Moderate,
    /// Writes files or executes arbitrary commands
    Dangerous,
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityLevel::Safe => write!(f, "safe"),
            SecurityLevel::Moderate => write!(f, "moderate"),
            SecurityLevel::Dangerous => write!(f, "dangerous"),
        }
    }
}

/// Why a tool invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFailureKind {
    NotFound,
    PermissionDenied,
    AmbiguousMatch,
    NoMatch,
    Timeout,
    ProcessSpawnFailure,
    VcsNotPresent,
    NothingToCommit,
    Network,
    EmptyResult,
    InvalidInput,
    UnknownTool,
    Cancelled,
    Io,
}

impl ToolFailureKind {
    /// Stable label used in observations
    pub fn label(&self) -> &'static str {
        match self {
            ToolFailureKind::NotFound => "not-found",
            ToolFailureKind::PermissionDenied => "permission-denied",
            ToolFailureKind::AmbiguousMatch => "ambiguous-match",
            ToolFailureKind::NoMatch => "no-match",
            ToolFailureKind::Timeout => "timeout",
            ToolFailureKind::ProcessSpawnFailure => "process-spawn-failure",
            ToolFailureKind::VcsNotPresent => "vcs-not-present",
            ToolFailureKind::NothingToCommit => "nothing-to-commit",
            ToolFailureKind::Network => "network-failure",
            ToolFailureKind::EmptyResult => "empty-result",
            ToolFailureKind::InvalidInput => "invalid-input",
            ToolFailureKind::UnknownTool => "unknown-tool",
            ToolFailureKind::Cancelled => "cancelled",
            ToolFailureKind::Io => "io-error",
        }
    }
}

impl std::fmt::Display for ToolFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A failed tool invocation: kind plus human-readable detail
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ToolFailure {
    pub kind: ToolFailureKind,
    pub detail: String,
}

impl ToolFailure {
    pub fn new(kind: ToolFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ToolFailureKind::InvalidInput, detail)
    }

    /// Map a filesystem error on `path` to a failure kind
    pub fn from_io(err: &std::io::Error, path: &Path) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ToolFailureKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ToolFailureKind::PermissionDenied,
            _ => ToolFailureKind::Io,
        };
        Self::new(kind, format!("{}: {}", path.display(), err))
    }
}

/// Outcome of a tool: observation text or a failure
pub type ToolResult = Result<String, ToolFailure>;

/// One tool call emitted by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    pub input: String,
    pub result: Option<ToolResult>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            result: None,
        }
    }

    pub fn resolve(mut self, result: ToolResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Text fed back to the model for this invocation
    pub fn observation(&self) -> String {
        match &self.result {
            Some(Ok(output)) => format!("[{}]\n{}", self.name, output),
            Some(Err(failure)) => format!("[{} failed: {}]\n{}", self.name, failure.kind, failure.detail),
            None => format!("[{}: no result]", self.name),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.result, Some(Err(_)))
    }
}

/// Context provided to tools during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Directory relative paths resolve against
    pub working_dir: PathBuf,
    /// Maximum output length (truncate if exceeded)
    pub max_output_len: usize,
    /// Wall-clock limit for shell commands
    pub command_timeout: Duration,
    /// Limit for outbound HTTP requests
    pub http_timeout: Duration,
    /// Fired when the user confirms a cancel
    pub cancel: CancellationToken,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_output_len: 50_000,
            command_timeout: Duration::from_secs(60),
            http_timeout: Duration::from_secs(10),
            cancel: CancellationToken::new(),
        }
    }
}

impl ToolContext {
    /// Create a new context with the given working directory
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve a model-supplied path against the working directory
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path.trim());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Cut `output` to `max_output_len` bytes on a char boundary
    pub fn truncate(&self, output: String) -> String {
        if output.len() <= self.max_output_len {
            return output;
        }
        let mut end = self.max_output_len;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}\n\n[Output truncated at {} of {} bytes]",
            &output[..end],
            end,
            output.len()
        )
    }
}

/// The Tool trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses in `<tool name="...">`
    fn name(&self) -> &str;

    /// Get a description of what the tool does
    fn description(&self) -> &str;

    /// Shape of the text the tool expects between its tags
    fn input_format(&self) -> &str;

    /// Get the security level
    fn security_level(&self) -> SecurityLevel;

    /// Execute the tool with the raw input text
    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult;

    fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_format: self.input_format().to_string(),
            security_level: self.security_level(),
        }
    }
}

/// Static description of a tool, for listings and the system prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_format: String,
    pub security_level: SecurityLevel,
}

/// Every built-in tool kind. The registry is built from this table once at
/// startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ReadFile,
    WriteFile,
    EditFile,
    Shell,
    WebSearch,
    GrepSearch,
    GitStatus,
    GitDiff,
    GitLog,
    GitAdd,
    GitCommit,
}

impl ToolKind {
    pub const ALL: [ToolKind; 11] = [
        ToolKind::ReadFile,
        ToolKind::WriteFile,
        ToolKind::EditFile,
        ToolKind::Shell,
        ToolKind::WebSearch,
        ToolKind::GrepSearch,
        ToolKind::GitStatus,
        ToolKind::GitDiff,
        ToolKind::GitLog,
        ToolKind::GitAdd,
        ToolKind::GitCommit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::ReadFile => "read_file",
            ToolKind::WriteFile => "write_file",
            ToolKind::EditFile => "edit_file",
            ToolKind::Shell => "shell",
            ToolKind::WebSearch => "web_search",
            ToolKind::GrepSearch => "grep_search",
            ToolKind::GitStatus => "git_status",
            ToolKind::GitDiff => "git_diff",
            ToolKind::GitLog => "git_log",
            ToolKind::GitAdd => "git_add",
            ToolKind::GitCommit => "git_commit",
        }
    }

    /// Build the executor for this kind
    pub fn executor(&self) -> Box<dyn Tool> {
        use builtin::*;
        match self {
            ToolKind::ReadFile => Box::new(ReadFileTool),
            ToolKind::WriteFile => Box::new(WriteFileTool),
            ToolKind::EditFile => Box::new(EditFileTool),
            ToolKind::Shell => Box::new(ShellTool),
            ToolKind::WebSearch => Box::new(WebSearchTool::new()),
            ToolKind::GrepSearch => Box::new(GrepSearchTool),
            ToolKind::GitStatus => Box::new(GitTool::new(GitCommand::Status)),
            ToolKind::GitDiff => Box::new(GitTool::new(GitCommand::Diff)),
            ToolKind::GitLog => Box::new(GitTool::new(GitCommand::Log)),
            ToolKind::GitAdd => Box::new(GitTool::new(GitCommand::Add)),
            ToolKind::GitCommit => Box::new(GitTool::new(GitCommand::Commit)),
        }
    }
}

/// Names, descriptions, input formats and security levels of every
/// built-in tool, in registration order.
pub fn builtin_tools() -> Vec<ToolInfo> {
    ToolKind::ALL.iter().map(|kind| kind.executor().info()).collect()
}
