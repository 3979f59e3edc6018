//! ReAct agent: tag parsing, loop states and the loop controller

mod agent_loop;
pub mod events;
pub mod parser;
mod state;

pub use agent_loop::AgentLoop;
pub use events::{AgentEvent, EventReceiver, EventSender};
pub use parser::{StreamEvent, TagParser};
pub use state::{AgentConfig, FailureKind, LoopState, TaskOutcome, DEFAULT_MAX_STEPS};
