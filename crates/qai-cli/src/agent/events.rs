//! Events published by the agent loop for renderers

use tokio::sync::mpsc;

use crate::session::Message;
use crate::tools::ToolInvocation;

use super::parser::StreamEvent;
use super::state::{LoopState, TaskOutcome};

/// Something the loop did. Messages are clones; the session itself never
/// leaves the loop while it runs.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    StateChanged(LoopState),
    /// Parsed model output, forwarded as it streams
    Stream(StreamEvent),
    ToolStarted { name: String, input: String },
    ToolFinished(ToolInvocation),
    MessageAppended(Message),
    Finished(TaskOutcome),
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AgentEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
