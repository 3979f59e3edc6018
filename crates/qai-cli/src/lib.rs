//! qai: an autonomous ReAct coding assistant
//!
//! The agent streams a model turn, parses `<think>`, `<tool>` and
//! `<answer>` tags out of it, runs at most one tool per step and feeds the
//! result back until the model answers, the step budget runs out or the
//! user cancels.

pub mod agent;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod prompt;
pub mod render;
pub mod repl;
pub mod session;
pub mod tools;

pub use agent::{AgentConfig, AgentEvent, AgentLoop, FailureKind, LoopState, TaskOutcome};
pub use session::{Message, MessageRole, Session};
pub use tools::{builtin_tools, ToolInfo};
