//! Conversation/session store for one task
//!
//! The loop controller owns the [`Session`] and is the only writer. Readers
//! (the renderer) get clones of appended messages through agent events.

use chrono::{DateTime, Utc};
use qai_llm::ChatMessage;
use serde::Serialize;

/// Unique session identifier
pub type SessionId = String;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    /// A folded tool result
    Observation,
}

/// One immutable entry in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Position in the session, starting at 0
    pub index: usize,
    pub created_at: DateTime<Utc>,
}

/// Message log and counters for a single user task
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    messages: Vec<Message>,
    step_count: usize,
    cancelled: bool,
    active_tool: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: generate_session_id(),
            messages: Vec::new(),
            step_count: 0,
            cancelled: false,
            active_tool: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a message and return it. Indices are assigned in append order.
    pub fn append(&mut self, role: MessageRole, content: impl Into<String>) -> &Message {
        let index = self.messages.len();
        self.messages.push(Message {
            role,
            content: content.into(),
            index,
            created_at: Utc::now(),
        });
        &self.messages[index]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Count one more think/act/observe step
    pub fn begin_step(&mut self) -> usize {
        self.step_count += 1;
        self.step_count
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn active_tool(&self) -> Option<&str> {
        self.active_tool.as_deref()
    }

    /// Record the tool now in flight. At most one runs at a time.
    pub fn start_tool(&mut self, name: &str) {
        debug_assert!(
            self.active_tool.is_none(),
            "tool {:?} started while {:?} is running",
            name,
            self.active_tool
        );
        self.active_tool = Some(name.to_string());
    }

    pub fn finish_tool(&mut self) {
        self.active_tool = None;
    }

    /// History as sent to the provider. Observations become user turns
    /// wrapped in `<observation>` tags.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(|m| match m.role {
                MessageRole::User => ChatMessage::user(m.content.clone()),
                MessageRole::Assistant => ChatMessage::assistant(m.content.clone()),
                MessageRole::System => ChatMessage::system(m.content.clone()),
                MessageRole::Observation => {
                    ChatMessage::user(format!("<observation>\n{}\n</observation>", m.content))
                }
            })
            .collect()
    }
}

/// Generate a unique session ID
fn generate_session_id() -> SessionId {
    let now = Utc::now();
    let short = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &short[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use qai_llm::Role;

    #[test]
    fn test_append_assigns_indices() {
        let mut session = Session::new();
        session.append(MessageRole::User, "task");
        session.append(MessageRole::Assistant, "<think>hm</think>");
        let last = session.append(MessageRole::Observation, "output");
        assert_eq!(last.index, 2);

        let indices: Vec<usize> = session.messages().iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_single_active_tool() {
        let mut session = Session::new();
        session.start_tool("shell");
        assert_eq!(session.active_tool(), Some("shell"));
        session.finish_tool();
        assert_eq!(session.active_tool(), None);
        session.start_tool("read_file");
        assert_eq!(session.active_tool(), Some("read_file"));
    }

    #[test]
    #[should_panic(expected = "started while")]
    #[cfg(debug_assertions)]
    fn test_second_tool_while_running_panics_in_debug() {
        let mut session = Session::new();
        session.start_tool("shell");
        session.start_tool("read_file");
    }

    #[test]
    fn test_chat_messages_wrap_observations() {
        let mut session = Session::new();
        session.append(MessageRole::User, "fix the test");
        session.append(MessageRole::Assistant, "<tool name=\"shell\">cargo test</tool>");
        session.append(MessageRole::Observation, "[shell]\nok");

        let chat = session.to_chat_messages();
        assert_eq!(chat.len(), 3);
        assert_eq!(chat[2].role, Role::User);
        assert_eq!(chat[2].content, "<observation>\n[shell]\nok\n</observation>");
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(Session::new().id(), Session::new().id());
    }
}
