//! Decode vendor stream framing into uniform text deltas
//!
//! OpenAI-like and Anthropic endpoints frame the stream as server-sent
//! events; Ollama sends newline-delimited JSON. Network chunks may split a
//! line anywhere (including inside a UTF-8 sequence), so the decoder keeps
//! the unfinished tail between calls.

use serde_json::Value;
use tracing::trace;

use crate::error::LlmError;
use crate::provider::RequestShape;

/// A decoded unit of model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Text(String),
    /// The vendor signalled end of message
    Done,
}

/// Stateful line decoder for one response stream
#[derive(Debug)]
pub struct ChunkDecoder {
    shape: RequestShape,
    pending: Vec<u8>,
    done: bool,
}

impl ChunkDecoder {
    pub fn new(shape: RequestShape) -> Self {
        Self {
            shape,
            pending: Vec::new(),
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes; returns every delta completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Delta>, LlmError> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.decode_line(&line, &mut out)?;
        }
        Ok(out)
    }

    /// Flush an unterminated final line, if any.
    pub fn finish(&mut self) -> Result<Vec<Delta>, LlmError> {
        let mut out = Vec::new();
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.decode_line(&line, &mut out)?;
        }
        Ok(out)
    }

    fn decode_line(&mut self, raw: &[u8], out: &mut Vec<Delta>) -> Result<(), LlmError> {
        if self.done {
            return Ok(());
        }
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return Ok(());
        }

        let delta = match self.shape {
            RequestShape::OpenAiChat => match sse_data(line) {
                Some(data) => parse_openai(data)?,
                None => None,
            },
            RequestShape::AnthropicMessages => match sse_data(line) {
                Some(data) => parse_anthropic(data)?,
                None => None,
            },
            RequestShape::OllamaChat => parse_ollama(line)?,
        };

        if let Some(delta) = delta {
            if delta == Delta::Done {
                self.done = true;
            }
            out.push(delta);
        }
        Ok(())
    }
}

/// Payload of an SSE `data:` line. Comments, `event:` and `id:` lines carry
/// nothing the decoder needs.
fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data).trim();
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

fn parse_json(data: &str) -> Result<Value, LlmError> {
    serde_json::from_str(data)
        .map_err(|e| LlmError::ProtocolMismatch(format!("invalid JSON chunk ({}): {}", e, truncate(data))))
}

fn vendor_error(event: &Value) -> Option<String> {
    let err = event.get("error")?;
    let msg = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    Some(msg)
}

fn parse_openai(data: &str) -> Result<Option<Delta>, LlmError> {
    if data == "[DONE]" {
        return Ok(Some(Delta::Done));
    }
    let event = parse_json(data)?;
    if let Some(msg) = vendor_error(&event) {
        return Err(LlmError::ProtocolMismatch(format!("provider error: {}", msg)));
    }
    let choices = event
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::ProtocolMismatch(format!("chunk without choices: {}", truncate(data))))?;

    // Usage-only chunks have an empty choices array
    let Some(choice) = choices.first() else {
        return Ok(None);
    };
    match choice.pointer("/delta/content").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => Ok(Some(Delta::Text(text.to_string()))),
        _ => Ok(None),
    }
}

fn parse_anthropic(data: &str) -> Result<Option<Delta>, LlmError> {
    let event = parse_json(data)?;
    let event_type = event
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::ProtocolMismatch(format!("event without type: {}", truncate(data))))?;

    match event_type {
        "content_block_delta" => {
            let delta = event
                .get("delta")
                .ok_or_else(|| LlmError::ProtocolMismatch("content_block_delta without delta".into()))?;
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => {
                    let text = delta
                        .get("text")
                        .and_then(Value::as_str)
                        .ok_or_else(|| LlmError::ProtocolMismatch("text_delta without text".into()))?;
                    Ok(Some(Delta::Text(text.to_string())))
                }
                other => {
                    trace!(delta_type = ?other, "Skipping non-text Anthropic delta");
                    Ok(None)
                }
            }
        }
        "message_stop" => Ok(Some(Delta::Done)),
        "error" => {
            let msg = vendor_error(&event).unwrap_or_else(|| "unknown error".to_string());
            Err(LlmError::ProtocolMismatch(format!("provider error: {}", msg)))
        }
        other => {
            trace!(event_type = other, "Ignoring Anthropic event");
            Ok(None)
        }
    }
}

fn parse_ollama(line: &str) -> Result<Option<Delta>, LlmError> {
    let event = parse_json(line.trim())?;
    if let Some(msg) = vendor_error(&event) {
        return Err(LlmError::ProtocolMismatch(format!("provider error: {}", msg)));
    }

    let done = event.get("done").and_then(Value::as_bool).unwrap_or(false);
    let text = event.pointer("/message/content").and_then(Value::as_str);

    match (text, done) {
        (_, true) => Ok(Some(Delta::Done)),
        (Some(text), false) if !text.is_empty() => Ok(Some(Delta::Text(text.to_string()))),
        (Some(_), false) => Ok(None),
        (None, false) => Err(LlmError::ProtocolMismatch(format!(
            "chunk without message content: {}",
            truncate(line)
        ))),
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(120) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
