//! Terminal rendering of agent events
//!
//! The renderer only sees [`AgentEvent`]s; it never touches the session.

use std::io::Write;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

use crate::agent::{AgentEvent, EventReceiver, StreamEvent, TaskOutcome};
use crate::tools::ToolInvocation;

// ANSI colors
pub const GREEN: &str = "\x1b[92m";
pub const BLUE: &str = "\x1b[94m";
pub const YELLOW: &str = "\x1b[93m";
pub const RED: &str = "\x1b[91m";
pub const CYAN: &str = "\x1b[96m";
pub const DIM: &str = "\x1b[2m";
pub const BOLD: &str = "\x1b[1m";
pub const RESET: &str = "\x1b[0m";

/// Lines of tool output echoed to the terminal
const PREVIEW_LINES: usize = 6;

pub struct Renderer<W: Write> {
    out: W,
    show_thinking: bool,
    use_spinner: bool,
    spinner: Option<ProgressBar>,
    in_think: bool,
    /// Whether the cursor sits at the start of a line
    line_start: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            show_thinking: true,
            use_spinner: false,
            spinner: None,
            in_think: false,
            line_start: true,
        }
    }

    pub fn with_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }

    pub fn with_spinner(mut self, enabled: bool) -> Self {
        self.use_spinner = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn handle(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Stream(stream) => self.stream(stream),
            AgentEvent::ToolStarted { name, input } => {
                self.newline();
                let summary = input.lines().next().unwrap_or("").trim();
                self.write(&format!("{}[tool: {}]{} {}{}{}\n", CYAN, name, RESET, DIM, summary, RESET));
                self.start_spinner(name);
            }
            AgentEvent::ToolFinished(invocation) => {
                self.stop_spinner();
                let text = tool_result_text(invocation);
                self.write(&text);
            }
            AgentEvent::Finished(outcome) => {
                self.stop_spinner();
                self.newline();
                let line = outcome_line(outcome);
                self.write(&format!("{}\n", line));
            }
            AgentEvent::StateChanged(_) | AgentEvent::MessageAppended(_) => {}
        }
        let _ = self.out.flush();
    }

    fn stream(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ThinkOpen => {
                self.in_think = true;
                if self.show_thinking {
                    self.newline();
                    self.write(DIM);
                }
            }
            StreamEvent::ThinkClose => {
                self.in_think = false;
                if self.show_thinking {
                    self.write(RESET);
                    self.newline();
                }
            }
            StreamEvent::AnswerOpen => {
                self.newline();
                self.write(BOLD);
            }
            StreamEvent::AnswerClose => {
                self.write(RESET);
                self.newline();
            }
            StreamEvent::TextDelta(text) => {
                if !self.in_think || self.show_thinking {
                    self.write(text);
                }
            }
            StreamEvent::ToolCall { .. } | StreamEvent::StreamEnd | StreamEvent::StreamError(_) => {}
        }
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        let visible = strip_ansi(text);
        if !visible.is_empty() {
            self.line_start = visible.ends_with('\n');
        }
    }

    fn newline(&mut self) {
        if !self.line_start {
            let _ = self.out.write_all(b"\n");
            self.line_start = true;
        }
    }

    fn start_spinner(&mut self, tool: &str) {
        if !self.use_spinner {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(format!("Running {}...", tool));
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

/// Drain events to stdout until the loop finishes or the channel closes
pub fn spawn_stdout(mut events: EventReceiver, show_thinking: bool) -> JoinHandle<()> {
    let interactive = std::io::IsTerminal::is_terminal(&std::io::stderr());
    tokio::spawn(async move {
        let mut renderer = Renderer::new(std::io::stdout())
            .with_thinking(show_thinking)
            .with_spinner(interactive);
        while let Some(event) = events.recv().await {
            renderer.handle(&event);
            if matches!(event, AgentEvent::Finished(_)) {
                break;
            }
        }
    })
}

/// Drop `ESC [ ... letter` sequences
fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn tool_result_text(invocation: &ToolInvocation) -> String {
    let (status, body) = match &invocation.result {
        Some(Ok(output)) => (format!("{}ok{}", GREEN, RESET), output.as_str()),
        Some(Err(failure)) => (format!("{}failed: {}{}", YELLOW, failure.kind, RESET), failure.detail.as_str()),
        None => (format!("{}no result{}", YELLOW, RESET), ""),
    };

    let mut text = format!("  {}\n", status);
    let lines: Vec<&str> = body.lines().collect();
    for line in lines.iter().take(PREVIEW_LINES) {
        text.push_str(&format!("  {}{}{}\n", DIM, line, RESET));
    }
    if lines.len() > PREVIEW_LINES {
        text.push_str(&format!("  {}... {} more lines{}\n", DIM, lines.len() - PREVIEW_LINES, RESET));
    }
    text
}

/// One colored line describing how a task ended
pub fn outcome_line(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Answered(_) => format!("{}✓ Done{}", GREEN, RESET),
        TaskOutcome::StepCapExceeded(partial) => {
            format!("{}Step budget exhausted.{} {}", YELLOW, RESET, partial)
        }
        TaskOutcome::Cancelled => format!("{}⛔ Cancelled{}", YELLOW, RESET),
        TaskOutcome::Failed { kind, detail } => format!("{}Failed ({}):{} {}", RED, kind, RESET, detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FailureKind;
    use crate::tools::{ToolFailure, ToolFailureKind};

    fn render(events: &[AgentEvent], show_thinking: bool) -> String {
        let mut renderer = Renderer::new(Vec::new()).with_thinking(show_thinking);
        for event in events {
            renderer.handle(event);
        }
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    fn text(s: &str) -> AgentEvent {
        AgentEvent::Stream(StreamEvent::TextDelta(s.into()))
    }

    #[test]
    fn test_hidden_thinking() {
        let events = vec![
            AgentEvent::Stream(StreamEvent::ThinkOpen),
            text("secret plan"),
            AgentEvent::Stream(StreamEvent::ThinkClose),
            AgentEvent::Stream(StreamEvent::AnswerOpen),
            text("result"),
            AgentEvent::Stream(StreamEvent::AnswerClose),
        ];
        let out = render(&events, false);
        assert!(!out.contains("secret plan"));
        assert!(out.contains("result"));

        let out = render(&events, true);
        assert!(out.contains("secret plan"));
    }

    #[test]
    fn test_tool_preview() {
        let invocation = ToolInvocation::new("shell", "ls").resolve(Ok((1..=10).map(|i| format!("f{}\n", i)).collect()));
        let out = render(
            &[
                AgentEvent::ToolStarted {
                    name: "shell".into(),
                    input: "ls\n".into(),
                },
                AgentEvent::ToolFinished(invocation),
            ],
            true,
        );
        assert!(out.contains("[tool: shell]"));
        assert!(out.contains("f6"));
        assert!(!out.contains("f7"));
        assert!(out.contains("4 more lines"));
    }

    #[test]
    fn test_failed_tool_shows_kind() {
        let invocation = ToolInvocation::new("edit_file", "x")
            .resolve(Err(ToolFailure::new(ToolFailureKind::NoMatch, "search block not found")));
        let out = render(&[AgentEvent::ToolFinished(invocation)], true);
        assert!(out.contains("failed: no-match"));
        assert!(out.contains("search block not found"));
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi(&format!("{}ok{}\n", GREEN, RESET)), "ok\n");
        assert_eq!(strip_ansi(DIM), "");
    }

    #[test]
    fn test_outcome_lines() {
        assert!(outcome_line(&TaskOutcome::Cancelled).contains("Cancelled"));
        let failed = outcome_line(&TaskOutcome::Failed {
            kind: FailureKind::HttpFailure(401),
            detail: "unauthorized".into(),
        });
        assert!(failed.contains("HTTP failure (401)"));
        assert!(failed.contains("unauthorized"));
    }
}
