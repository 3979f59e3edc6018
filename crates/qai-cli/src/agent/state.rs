//! Agent configuration, loop states and task outcomes

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use qai_llm::LlmError;

/// Default step budget per task
pub const DEFAULT_MAX_STEPS: usize = 15;

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Opaque prompt text placed before the generated tool instructions
    pub system_prompt: String,
    /// Maximum think/act/observe steps before stopping
    pub max_steps: usize,
    /// Working directory for tools
    pub working_dir: PathBuf,
    /// Wall-clock limit for a shell command
    pub shell_timeout: Duration,
    /// Tool output beyond this many bytes is truncated
    pub max_output_len: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_steps: DEFAULT_MAX_STEPS,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            shell_timeout: Duration::from_secs(60),
            max_output_len: 50_000,
        }
    }
}

impl AgentConfig {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout = timeout;
        self
    }

    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }
}

/// States of the ReAct loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    StreamingResponse,
    DispatchingTool,
    Answered,
    StepCapExceeded,
    Cancelled,
    Failed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopState::Answered | LoopState::StepCapExceeded | LoopState::Cancelled | LoopState::Failed
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::AwaitingModel => "awaiting-model",
            LoopState::StreamingResponse => "streaming-response",
            LoopState::DispatchingTool => "dispatching-tool",
            LoopState::Answered => "answered",
            LoopState::StepCapExceeded => "step-cap-exceeded",
            LoopState::Cancelled => "cancelled",
            LoopState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a task ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connect/read timeout, DNS, TLS, dropped connection
    NetworkFailure,
    /// The vendor response had an unexpected shape
    ProtocolMismatch,
    HttpFailure(u16),
    /// A `<tool>` tag was still open when the stream ended
    UnterminatedTag,
    /// A tool executor panicked
    ToolPanic,
    /// Missing token, endpoint or model
    Configuration,
}

impl FailureKind {
    /// Classify a provider error
    pub fn from_llm(err: &LlmError) -> Self {
        match err {
            LlmError::Network(_) | LlmError::Timeout(_) => FailureKind::NetworkFailure,
            LlmError::Http { status, .. } => FailureKind::HttpFailure(*status),
            LlmError::ProtocolMismatch(_) => FailureKind::ProtocolMismatch,
            LlmError::NotConfigured(_) => FailureKind::Configuration,
            // Callers check for cancellation before classifying
            LlmError::Cancelled => FailureKind::NetworkFailure,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NetworkFailure => write!(f, "network failure"),
            FailureKind::ProtocolMismatch => write!(f, "protocol mismatch"),
            FailureKind::HttpFailure(status) => write!(f, "HTTP failure ({})", status),
            FailureKind::UnterminatedTag => write!(f, "unterminated tag"),
            FailureKind::ToolPanic => write!(f, "tool panic"),
            FailureKind::Configuration => write!(f, "configuration error"),
        }
    }
}

/// How a task ended, as reported to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Answered(String),
    /// Step budget exhausted; carries the best partial answer available
    StepCapExceeded(String),
    Cancelled,
    Failed { kind: FailureKind, detail: String },
}

impl TaskOutcome {
    pub fn state(&self) -> LoopState {
        match self {
            TaskOutcome::Answered(_) => LoopState::Answered,
            TaskOutcome::StepCapExceeded(_) => LoopState::StepCapExceeded,
            TaskOutcome::Cancelled => LoopState::Cancelled,
            TaskOutcome::Failed { .. } => LoopState::Failed,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}
