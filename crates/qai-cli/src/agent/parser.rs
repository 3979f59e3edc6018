//! Incremental parser for `<think>`, `<tool>` and `<answer>` regions
//!
//! Model output arrives in arbitrary slices, so a tag may be split across
//! deltas. The parser keeps the unconsumed tail that could still turn into
//! a tag and one structural context. Think and answer bodies stream through
//! as text; tool bodies are buffered until `</tool>`.

use super::state::FailureKind;

/// Opening tags longer than this without a `>` are treated as text
const MAX_OPEN_TAG_LEN: usize = 256;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";
const ANSWER_OPEN: &str = "<answer>";
const ANSWER_CLOSE: &str = "</answer>";
const TOOL_OPEN_PREFIX: &str = "<tool";
const TOOL_CLOSE: &str = "</tool>";

/// Structured event recovered from the model stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    ThinkOpen,
    ThinkClose,
    ToolCall { name: String, input: String },
    AnswerOpen,
    AnswerClose,
    StreamEnd,
    StreamError(FailureKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Context {
    Plain,
    Think,
    Answer,
    /// Inside a tool body; `None` is the legacy `<tool>name\n...` form
    Tool { name: Option<String> },
}

/// Result of looking at a `<` in a streaming context
enum TagMatch {
    /// A complete tag of this many bytes
    Tag(usize, Tag),
    /// Could still become a tag; wait for more input
    Partial,
    /// Not a tag; the `<` is text
    NotATag,
}

enum Tag {
    Fixed(Marker),
    ToolOpen(Option<String>),
}

/// Tags without attributes
#[derive(Debug, Clone, Copy)]
enum Marker {
    ThinkOpen,
    ThinkClose,
    AnswerOpen,
    AnswerClose,
}

const PLAIN_MARKERS: &[(&str, Marker)] = &[(THINK_OPEN, Marker::ThinkOpen), (ANSWER_OPEN, Marker::AnswerOpen)];
const THINK_MARKERS: &[(&str, Marker)] = &[(THINK_CLOSE, Marker::ThinkClose)];
const ANSWER_MARKERS: &[(&str, Marker)] = &[(ANSWER_CLOSE, Marker::AnswerClose)];

/// Incremental tag parser
#[derive(Debug)]
pub struct TagParser {
    context: Context,
    /// Input not yet turned into events
    pending: String,
    tool_body: String,
    finished: bool,
}

impl Default for TagParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TagParser {
    pub fn new() -> Self {
        Self {
            context: Context::Plain,
            pending: String::new(),
            tool_body: String::new(),
            finished: false,
        }
    }

    /// Feed the next text delta
    pub fn feed(&mut self, delta: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.pending.push_str(delta);
        self.drain(&mut events);
        events
    }

    /// Signal end of stream. Open think/answer regions are closed; an open
    /// tool region is an error.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.finished = true;

        match self.context {
            Context::Tool { .. } => {
                events.push(StreamEvent::StreamError(FailureKind::UnterminatedTag));
                return events;
            }
            Context::Plain | Context::Think | Context::Answer => {
                let rest = std::mem::take(&mut self.pending);
                push_text(&mut events, &rest);
            }
        }
        match self.context {
            Context::Think => events.push(StreamEvent::ThinkClose),
            Context::Answer => events.push(StreamEvent::AnswerClose),
            _ => {}
        }
        self.context = Context::Plain;
        events.push(StreamEvent::StreamEnd);
        events
    }

    fn drain(&mut self, events: &mut Vec<StreamEvent>) {
        loop {
            let progressed = match self.context {
                Context::Tool { .. } => self.drain_tool(events),
                _ => self.drain_streaming(events),
            };
            if !progressed {
                break;
            }
        }
    }

    /// Streaming contexts: emit text up to the next possible tag.
    /// Returns true if the context changed and draining should continue.
    fn drain_streaming(&mut self, events: &mut Vec<StreamEvent>) -> bool {
        let mut cursor = 0;
        loop {
            let Some(rel) = self.pending[cursor..].find('<') else {
                let text = std::mem::take(&mut self.pending);
                push_text(events, &text);
                return false;
            };
            let lt = cursor + rel;

            match self.match_tag(&self.pending[lt..]) {
                TagMatch::NotATag => {
                    cursor = lt + 1;
                }
                TagMatch::Partial => {
                    push_text(events, &self.pending[..lt]);
                    self.pending.drain(..lt);
                    return false;
                }
                TagMatch::Tag(len, tag) => {
                    push_text(events, &self.pending[..lt]);
                    self.pending.drain(..lt + len);
                    self.enter(tag, events);
                    return true;
                }
            }
        }
    }

    /// Tool context: buffer until `</tool>`
    fn drain_tool(&mut self, events: &mut Vec<StreamEvent>) -> bool {
        if let Some(idx) = self.pending.find(TOOL_CLOSE) {
            self.tool_body.push_str(&self.pending[..idx]);
            self.pending.drain(..idx + TOOL_CLOSE.len());

            let name = match std::mem::replace(&mut self.context, Context::Plain) {
                Context::Tool { name } => name,
                _ => None,
            };
            let body = std::mem::take(&mut self.tool_body);
            events.push(tool_call(name, &body));
            return true;
        }

        // Keep a tail that may be the start of `</tool>`
        let keep = (1..TOOL_CLOSE.len())
            .rev()
            .find(|&k| self.pending.ends_with(&TOOL_CLOSE[..k]))
            .unwrap_or(0);
        let split = self.pending.len() - keep;
        self.tool_body.push_str(&self.pending[..split]);
        self.pending.drain(..split);
        false
    }

    fn match_tag(&self, rest: &str) -> TagMatch {
        let markers = match self.context {
            Context::Plain => PLAIN_MARKERS,
            Context::Think => THINK_MARKERS,
            Context::Answer => ANSWER_MARKERS,
            Context::Tool { .. } => &[],
        };

        let mut partial = false;
        for &(text, marker) in markers {
            if rest.starts_with(text) {
                return TagMatch::Tag(text.len(), Tag::Fixed(marker));
            }
            if text.starts_with(rest) {
                partial = true;
            }
        }

        if self.context == Context::Plain {
            match match_tool_open(rest) {
                TagMatch::NotATag => {}
                TagMatch::Partial => partial = true,
                found => return found,
            }
        }

        if partial {
            TagMatch::Partial
        } else {
            TagMatch::NotATag
        }
    }

    fn enter(&mut self, tag: Tag, events: &mut Vec<StreamEvent>) {
        match tag {
            Tag::Fixed(Marker::ThinkOpen) => {
                self.context = Context::Think;
                events.push(StreamEvent::ThinkOpen);
            }
            Tag::Fixed(Marker::ThinkClose) => {
                self.context = Context::Plain;
                events.push(StreamEvent::ThinkClose);
            }
            Tag::Fixed(Marker::AnswerOpen) => {
                self.context = Context::Answer;
                events.push(StreamEvent::AnswerOpen);
            }
            Tag::Fixed(Marker::AnswerClose) => {
                self.context = Context::Plain;
                events.push(StreamEvent::AnswerClose);
            }
            Tag::ToolOpen(name) => {
                self.context = Context::Tool { name };
                self.tool_body.clear();
            }
        }
    }
}

fn push_text(events: &mut Vec<StreamEvent>, text: &str) {
    if !text.is_empty() {
        events.push(StreamEvent::TextDelta(text.to_string()));
    }
}

/// Match `<tool>` or `<tool name="...">` at the start of `rest`
fn match_tool_open(rest: &str) -> TagMatch {
    if rest.len() < TOOL_OPEN_PREFIX.len() {
        return if TOOL_OPEN_PREFIX.starts_with(rest) {
            TagMatch::Partial
        } else {
            TagMatch::NotATag
        };
    }
    if !rest.starts_with(TOOL_OPEN_PREFIX) {
        return TagMatch::NotATag;
    }

    let after = &rest[TOOL_OPEN_PREFIX.len()..];
    match after.chars().next() {
        None => return TagMatch::Partial,
        Some('>') => return TagMatch::Tag(TOOL_OPEN_PREFIX.len() + 1, Tag::ToolOpen(None)),
        Some(c) if c.is_whitespace() => {}
        Some(_) => return TagMatch::NotATag,
    }

    match after.find('>') {
        Some(gt) => {
            let len = TOOL_OPEN_PREFIX.len() + gt + 1;
            if len > MAX_OPEN_TAG_LEN {
                return TagMatch::NotATag;
            }
            TagMatch::Tag(len, Tag::ToolOpen(parse_name_attr(&after[..gt])))
        }
        None if rest.len() > MAX_OPEN_TAG_LEN => TagMatch::NotATag,
        None => TagMatch::Partial,
    }
}

/// Extract the value of `name=` from tag attributes. Quotes are optional.
fn parse_name_attr(attrs: &str) -> Option<String> {
    let attrs = attrs.trim();
    let value = attrs.strip_prefix("name")?.trim_start().strip_prefix('=')?.trim_start();
    let name = match value.chars().next()? {
        quote @ ('"' | '\'') => {
            let inner = &value[1..];
            &inner[..inner.find(quote)?]
        }
        _ => value.split_whitespace().next()?,
    };
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Strip one leading and one trailing newline, nothing else
fn strip_single_newlines(body: &str) -> &str {
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);
    body.strip_suffix("\r\n")
        .or_else(|| body.strip_suffix('\n'))
        .unwrap_or(body)
}

fn tool_call(name: Option<String>, body: &str) -> StreamEvent {
    let body = strip_single_newlines(body);
    match name {
        Some(name) => StreamEvent::ToolCall {
            name,
            input: body.to_string(),
        },
        None => {
            // Legacy form: first line is the tool name
            let (name, input) = body.split_once('\n').unwrap_or((body, ""));
            StreamEvent::ToolCall {
                name: name.trim().to_string(),
                input: input.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse `chunks` and merge adjacent text deltas
    fn parse(chunks: &[&str]) -> Vec<StreamEvent> {
        let mut parser = TagParser::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(parser.feed(chunk));
        }
        events.extend(parser.finish());
        coalesce(events)
    }

    fn coalesce(events: Vec<StreamEvent>) -> Vec<StreamEvent> {
        let mut out: Vec<StreamEvent> = Vec::new();
        for event in events {
            if let (Some(StreamEvent::TextDelta(prev)), StreamEvent::TextDelta(next)) = (out.last_mut(), &event) {
                prev.push_str(next);
                continue;
            }
            out.push(event);
        }
        out
    }

    fn call(name: &str, input: &str) -> StreamEvent {
        StreamEvent::ToolCall {
            name: name.into(),
            input: input.into(),
        }
    }

    #[test]
    fn test_tool_tag_split_across_deltas() {
        let whole = parse(&["<tool name=\"read_file\">a.txt</tool>"]);
        let split = parse(&["<tool name=\"read_file\">a.txt</too", "l>"]);
        assert_eq!(whole, vec![call("read_file", "a.txt"), StreamEvent::StreamEnd]);
        assert_eq!(split, whole);
    }

    #[test]
    fn test_every_split_point_gives_same_events() {
        let text = "Let me look.<think>need the \u{e9} file</think>\n<tool name=\"read_file\">\nsrc/lib.rs\n</tool>";
        let expected = parse(&[text]);
        for (i, _) in text.char_indices().skip(1) {
            assert_eq!(parse(&[&text[..i], &text[i..]]), expected, "split at {}", i);
        }
        // One character at a time
        let chars: Vec<String> = text.chars().map(String::from).collect();
        let refs: Vec<&str> = chars.iter().map(String::as_str).collect();
        assert_eq!(parse(&refs), expected);
    }

    #[test]
    fn test_think_and_answer_stream_text() {
        let events = parse(&["<think>plan", " more</think><answer>The fix", " works</answer>"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::ThinkOpen,
                StreamEvent::TextDelta("plan more".into()),
                StreamEvent::ThinkClose,
                StreamEvent::AnswerOpen,
                StreamEvent::TextDelta("The fix works".into()),
                StreamEvent::AnswerClose,
                StreamEvent::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_think_text_is_emitted_before_close_arrives() {
        let mut parser = TagParser::new();
        let events = parser.feed("<think>partial reasoning");
        assert_eq!(
            events,
            vec![
                StreamEvent::ThinkOpen,
                StreamEvent::TextDelta("partial reasoning".into())
            ]
        );
    }

    #[test]
    fn test_tool_input_strips_single_newlines_only() {
        let events = parse(&["<tool name=\"write_file\">\nf.txt\n\nbody\n\n</tool>"]);
        assert_eq!(events[0], call("write_file", "f.txt\n\nbody\n"));
    }

    #[test]
    fn test_legacy_tool_form() {
        let events = parse(&["<tool>\nshell\nls -la\n</tool>"]);
        assert_eq!(events[0], call("shell", "ls -la"));
    }

    #[test]
    fn test_single_quoted_and_bare_names() {
        assert_eq!(parse(&["<tool name='git_status'></tool>"])[0], call("git_status", ""));
        assert_eq!(parse(&["<tool name=git_log>5</tool>"])[0], call("git_log", "5"));
    }

    #[test]
    fn test_tool_inside_think_is_text() {
        let events = parse(&["<think>maybe <tool name=\"shell\">ls</tool></think>"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::ThinkOpen,
                StreamEvent::TextDelta("maybe <tool name=\"shell\">ls</tool>".into()),
                StreamEvent::ThinkClose,
                StreamEvent::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_unknown_angle_brackets_are_text() {
        let events = parse(&["if a < b && Vec<u8> <toolbox>"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("if a < b && Vec<u8> <toolbox>".into()),
                StreamEvent::StreamEnd
            ]
        );
    }

    #[test]
    fn test_tool_body_keeps_markup() {
        let events = parse(&["<tool name=\"write_file\">index.html\n<html><body></body></html></tool>"]);
        assert_eq!(events[0], call("write_file", "index.html\n<html><body></body></html>"));
    }

    #[test]
    fn test_unterminated_tool_is_error() {
        let events = parse(&["<tool name=\"shell\">sleep 1"]);
        assert_eq!(events, vec![StreamEvent::StreamError(FailureKind::UnterminatedTag)]);
    }

    #[test]
    fn test_unterminated_answer_closes_implicitly() {
        let events = parse(&["<answer>done"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::AnswerOpen,
                StreamEvent::TextDelta("done".into()),
                StreamEvent::AnswerClose,
                StreamEvent::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_partial_tag_at_end_is_flushed_as_text() {
        let events = parse(&["all good <thi"]);
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta("all good <thi".into()), StreamEvent::StreamEnd]
        );
    }

    #[test]
    fn test_overlong_open_tag_is_text() {
        let long = format!("<tool {}", "x".repeat(300));
        let events = parse(&[&long]);
        assert_eq!(events, vec![StreamEvent::TextDelta(long.clone()), StreamEvent::StreamEnd]);
    }

    #[test]
    fn test_parse_name_attr() {
        assert_eq!(parse_name_attr(" name=\"read_file\""), Some("read_file".into()));
        assert_eq!(parse_name_attr("name = 'x' extra=1"), Some("x".into()));
        assert_eq!(parse_name_attr("id=\"x\""), None);
        assert_eq!(parse_name_attr("name=\"\""), None);
    }
}
