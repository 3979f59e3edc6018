//! ReAct loop controller
//!
//! One task runs as a strict sequence: request a model turn, parse it, run at
//! most one tool, fold the result back in as an observation, repeat. The
//! session is owned here and only mutated between those steps.

use std::sync::Arc;

use futures::StreamExt;
use qai_llm::{ChatBackend, LlmError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::session::{MessageRole, Session};
use crate::tools::router::ToolRouter;
use crate::tools::{ToolContext, ToolInvocation};

use super::events::{AgentEvent, EventSender};
use super::parser::{StreamEvent, TagParser};
use super::state::{AgentConfig, FailureKind, LoopState, TaskOutcome};

/// Tool name a model may use to hand in its final answer
const ANSWER_TOOL: &str = "answer";

const REACT_INSTRUCTIONS: &str = "\
You solve tasks step by step. In each reply you may reason inside <think>...</think>, \
then either call exactly one tool or give the final answer.

To call a tool, write:
<tool name=\"TOOL_NAME\">
INPUT
</tool>
Then stop and wait. The result comes back inside <observation>...</observation>.

When the task is done, write the final answer inside <answer>...</answer>.

Available tools:
";

/// How one model turn ended
enum Turn {
    Tool { name: String, input: String },
    Answer(String),
    /// Prose without any structural tag
    Plain(String),
    /// Only reasoning, or nothing at all
    Thought,
    Cancelled,
    Failed { kind: FailureKind, detail: String },
}

/// Collects one turn's parsed events
#[derive(Default)]
struct TurnState {
    /// Canonical transcript of the turn, stored as the assistant message
    transcript: String,
    prose: String,
    answer: Option<String>,
    in_think: bool,
    in_answer: bool,
    saw_tag: bool,
}

impl TurnState {
    /// Fold one event in. Returns the turn result once the turn is decided.
    fn apply(&mut self, event: StreamEvent) -> Option<Turn> {
        match event {
            StreamEvent::TextDelta(text) => {
                self.transcript.push_str(&text);
                if self.in_answer {
                    self.answer.get_or_insert_with(String::new).push_str(&text);
                } else if !self.in_think {
                    self.prose.push_str(&text);
                }
            }
            StreamEvent::ThinkOpen => {
                self.saw_tag = true;
                self.in_think = true;
                self.transcript.push_str("<think>");
            }
            StreamEvent::ThinkClose => {
                self.in_think = false;
                self.transcript.push_str("</think>");
            }
            StreamEvent::AnswerOpen => {
                self.saw_tag = true;
                self.in_answer = true;
                self.answer.get_or_insert_with(String::new);
                self.transcript.push_str("<answer>");
            }
            StreamEvent::AnswerClose => {
                self.in_answer = false;
                self.transcript.push_str("</answer>");
                let answer = self.answer.take().unwrap_or_default();
                return Some(Turn::Answer(answer.trim().to_string()));
            }
            StreamEvent::ToolCall { name, input } => {
                self.transcript
                    .push_str(&format!("<tool name=\"{}\">\n{}\n</tool>", name, input));
                return Some(Turn::Tool { name, input });
            }
            StreamEvent::StreamEnd => {
                let prose = self.prose.trim();
                if !self.saw_tag && !prose.is_empty() {
                    return Some(Turn::Plain(prose.to_string()));
                }
                return Some(Turn::Thought);
            }
            StreamEvent::StreamError(kind) => {
                return Some(Turn::Failed {
                    kind,
                    detail: "model output ended inside a <tool> tag".to_string(),
                });
            }
        }
        None
    }
}

/// The agent loop orchestrator
pub struct AgentLoop {
    backend: Arc<dyn ChatBackend>,
    router: Arc<ToolRouter>,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(backend: Arc<dyn ChatBackend>, router: Arc<ToolRouter>, config: AgentConfig) -> Self {
        Self {
            backend,
            router,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Prompt blob followed by the generated tool instructions
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.trim_end().to_string();
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str(REACT_INSTRUCTIONS);
        for tool in self.router.registry().infos() {
            prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            if !tool.input_format.is_empty() {
                prompt.push_str(&format!("  Input: {}\n", tool.input_format));
            }
        }
        prompt
    }

    /// Run one task to a terminal outcome.
    ///
    /// Returns the outcome and the finished session. `events` may be closed;
    /// publishing is best effort.
    #[instrument(skip_all, fields(model = %self.backend.model(), max_steps = self.config.max_steps))]
    pub async fn run(
        &self,
        task: &str,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> (TaskOutcome, Session) {
        info!(task_len = task.len(), "Starting agent loop");

        let mut session = Session::new();
        append(&mut session, events, MessageRole::User, task);

        let system_prompt = self.system_prompt();
        let tool_ctx = ToolContext::new(self.config.working_dir.clone())
            .with_command_timeout(self.config.shell_timeout)
            .with_max_output_len(self.config.max_output_len)
            .with_cancel(cancel.clone());

        // Last prose the model wrote outside tags, for a step-cap summary
        let mut last_prose = String::new();

        let outcome = loop {
            publish(events, AgentEvent::StateChanged(LoopState::AwaitingModel));

            if cancel.is_cancelled() {
                break TaskOutcome::Cancelled;
            }
            if session.step_count() >= self.config.max_steps {
                warn!(steps = session.step_count(), "Step budget exhausted");
                let partial = if last_prose.is_empty() {
                    self.step_cap_notice()
                } else {
                    last_prose.clone()
                };
                break TaskOutcome::StepCapExceeded(partial);
            }

            publish(events, AgentEvent::StateChanged(LoopState::StreamingResponse));
            let (turn, transcript, prose) = self.stream_turn(&session, &system_prompt, cancel, events).await;
            if !prose.is_empty() {
                last_prose = prose;
            }

            match turn {
                Turn::Cancelled => break TaskOutcome::Cancelled,
                Turn::Failed { kind, detail } => {
                    if !transcript.is_empty() {
                        append(&mut session, events, MessageRole::Assistant, transcript);
                    }
                    break TaskOutcome::Failed { kind, detail };
                }
                Turn::Answer(answer) => {
                    append(&mut session, events, MessageRole::Assistant, transcript);
                    break TaskOutcome::Answered(answer);
                }
                Turn::Plain(text) => {
                    append(&mut session, events, MessageRole::Assistant, transcript);
                    break TaskOutcome::Answered(text);
                }
                Turn::Thought => {
                    let step = session.begin_step();
                    debug!(step, "Reasoning-only turn");
                    if !transcript.is_empty() {
                        append(&mut session, events, MessageRole::Assistant, transcript);
                    }
                }
                Turn::Tool { name, input } => {
                    append(&mut session, events, MessageRole::Assistant, transcript);
                    if name == ANSWER_TOOL {
                        break TaskOutcome::Answered(input.trim().to_string());
                    }

                    let step = session.begin_step();
                    publish(events, AgentEvent::StateChanged(LoopState::DispatchingTool));
                    debug!(step, tool = %name, "Dispatching tool");

                    match self.dispatch(&mut session, &tool_ctx, events, name, input).await {
                        Ok(invocation) => {
                            append(&mut session, events, MessageRole::Observation, invocation.observation());
                        }
                        Err(detail) => {
                            break TaskOutcome::Failed {
                                kind: FailureKind::ToolPanic,
                                detail,
                            };
                        }
                    }
                }
            }
        };

        self.finish(&mut session, events, &outcome);
        (outcome, session)
    }

    /// Request and parse one model turn. Stops reading at the first tool call
    /// or closed answer; dropping the stream closes the connection.
    async fn stream_turn(
        &self,
        session: &Session,
        system_prompt: &str,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> (Turn, String, String) {
        let history = session.to_chat_messages();
        let mut state = TurnState::default();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (Turn::Cancelled, String::new(), String::new()),
            opened = self.backend.stream_chat(&history, system_prompt, cancel) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) => return (llm_failure(err, cancel), String::new(), String::new()),
        };

        let mut parser = TagParser::new();
        let turn = 'read: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'read Turn::Cancelled,
                next = stream.next() => next,
            };
            let parsed = match next {
                Some(Ok(delta)) => parser.feed(&delta),
                Some(Err(err)) => break 'read llm_failure(err, cancel),
                None => parser.finish(),
            };
            for event in parsed {
                publish(events, AgentEvent::Stream(event.clone()));
                if let Some(turn) = state.apply(event) {
                    break 'read turn;
                }
            }
        };

        (turn, state.transcript, state.prose.trim().to_string())
    }

    /// Run one tool on its own task. `Err` carries a panic description.
    async fn dispatch(
        &self,
        session: &mut Session,
        ctx: &ToolContext,
        events: &EventSender,
        name: String,
        input: String,
    ) -> Result<ToolInvocation, String> {
        session.start_tool(&name);
        publish(
            events,
            AgentEvent::ToolStarted {
                name: name.clone(),
                input: input.clone(),
            },
        );

        let router = Arc::clone(&self.router);
        let ctx = ctx.clone();
        let (tool_name, tool_input) = (name.clone(), input.clone());
        let handle = tokio::spawn(async move { router.route(&tool_name, &tool_input, &ctx).await });
        let joined = handle.await;
        session.finish_tool();

        match joined {
            Ok(result) => {
                let invocation = ToolInvocation::new(name, input).resolve(result);
                publish(events, AgentEvent::ToolFinished(invocation.clone()));
                Ok(invocation)
            }
            Err(err) => {
                warn!(tool = %name, error = %err, "Tool task did not complete");
                Err(format!("tool '{}' panicked: {}", name, err))
            }
        }
    }

    fn step_cap_notice(&self) -> String {
        format!(
            "Step budget of {} exhausted before the task was answered.",
            self.config.max_steps
        )
    }

    /// Append the closing summary and publish the outcome
    fn finish(&self, session: &mut Session, events: &EventSender, outcome: &TaskOutcome) {
        let summary = match outcome {
            TaskOutcome::Answered(_) => None,
            TaskOutcome::StepCapExceeded(_) => Some(self.step_cap_notice()),
            TaskOutcome::Cancelled => {
                session.mark_cancelled();
                Some("Task cancelled by user.".to_string())
            }
            TaskOutcome::Failed { kind, detail } => Some(format!("Task failed ({}): {}", kind, detail)),
        };
        if let Some(summary) = summary {
            append(session, events, MessageRole::System, summary);
        }

        info!(
            outcome = %outcome.state(),
            steps = session.step_count(),
            messages = session.messages().len(),
            "Agent loop finished"
        );
        publish(events, AgentEvent::StateChanged(outcome.state()));
        publish(events, AgentEvent::Finished(outcome.clone()));
    }
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("model", &self.backend.model())
            .field("router", &self.router)
            .field("config", &self.config)
            .finish()
    }
}

fn llm_failure(err: LlmError, cancel: &CancellationToken) -> Turn {
    if cancel.is_cancelled() || matches!(err, LlmError::Cancelled) {
        return Turn::Cancelled;
    }
    warn!(error = %err, "Model request failed");
    Turn::Failed {
        kind: FailureKind::from_llm(&err),
        detail: err.to_string(),
    }
}

fn append(session: &mut Session, events: &EventSender, role: MessageRole, content: impl Into<String>) {
    let message = session.append(role, content).clone();
    publish(events, AgentEvent::MessageAppended(message));
}

fn publish(events: &EventSender, event: AgentEvent) {
    // Receiver may be gone; the loop does not depend on it
    let _ = events.send(event);
}
