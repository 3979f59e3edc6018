//! Translate a provider-neutral chat request into a vendor HTTP request
//!
//! Bodies are built from `Serialize` structs so field order (and therefore
//! the serialized bytes) is fixed for a given history, prompt and model.

use serde::Serialize;

use crate::error::LlmError;
use crate::message::{ChatMessage, Role};
use crate::provider::{AuthScheme, ProviderConfig, RequestShape};

/// Anthropic API version sent with every messages request
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Output token budget for Anthropic requests, which require one
pub const ANTHROPIC_MAX_TOKENS: u32 = 4096;

/// A fully built vendor request, ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// Header lookup by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAiBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct AnthropicBody<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

/// Build the vendor request for one model turn.
///
/// `history` is the conversation so far (observations already folded into
/// user turns). `token` is the API token for this provider, if any.
pub fn build_request(
    provider: &ProviderConfig,
    model: &str,
    token: Option<&str>,
    history: &[ChatMessage],
    system_prompt: &str,
) -> Result<HttpRequest, LlmError> {
    if provider.chat_endpoint_url.is_empty() {
        return Err(LlmError::NotConfigured(format!(
            "no chat endpoint set for provider '{}'",
            provider.id
        )));
    }
    if model.trim().is_empty() {
        return Err(LlmError::NotConfigured("no model selected".to_string()));
    }

    let token = token.map(str::trim).filter(|t| !t.is_empty());
    if token.is_none() && provider.id.requires_token() {
        return Err(LlmError::NotConfigured(format!(
            "no API token stored for provider '{}'",
            provider.id
        )));
    }

    let body = match provider.request_shape {
        RequestShape::OpenAiChat => serialize(&OpenAiBody {
            model,
            messages: with_leading_system(history, system_prompt),
            stream: true,
        })?,
        RequestShape::OllamaChat => serialize(&OllamaBody {
            model,
            messages: with_leading_system(history, system_prompt),
            stream: true,
        })?,
        RequestShape::AnthropicMessages => {
            let (system, messages) = split_system(history, system_prompt);
            serialize(&AnthropicBody {
                model,
                max_tokens: ANTHROPIC_MAX_TOKENS,
                system,
                messages,
                stream: true,
            })?
        }
    };

    let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
    match (provider.auth_scheme, token) {
        (AuthScheme::Bearer, Some(token)) => {
            headers.push(("authorization".to_string(), format!("Bearer {}", token)));
        }
        (AuthScheme::XApiKey, Some(token)) => {
            headers.push(("x-api-key".to_string(), token.to_string()));
            headers.push(("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()));
        }
        _ => {}
    }

    Ok(HttpRequest {
        url: provider.chat_endpoint_url.clone(),
        headers,
        body,
    })
}

fn serialize<T: Serialize>(body: &T) -> Result<String, LlmError> {
    serde_json::to_string(body).map_err(|e| LlmError::ProtocolMismatch(e.to_string()))
}

fn with_leading_system<'a>(history: &'a [ChatMessage], system_prompt: &'a str) -> Vec<WireMessage<'a>> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(WireMessage {
            role: Role::System.as_str(),
            content: system_prompt,
        });
    }
    messages.extend(history.iter().map(|m| WireMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));
    messages
}

/// Anthropic takes the system prompt as a top-level field; any system-role
/// history entries are merged into it.
fn split_system<'a>(history: &'a [ChatMessage], system_prompt: &str) -> (String, Vec<WireMessage<'a>>) {
    let mut system_parts: Vec<&str> = Vec::new();
    if !system_prompt.is_empty() {
        system_parts.push(system_prompt);
    }
    let mut messages = Vec::with_capacity(history.len());
    for msg in history {
        match msg.role {
            Role::System => system_parts.push(&msg.content),
            Role::User | Role::Assistant => messages.push(WireMessage {
                role: msg.role.as_str(),
                content: &msg.content,
            }),
        }
    }
    (system_parts.join("\n\n"), messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;

    fn user_turn() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hi")]
    }

    #[test]
    fn test_openai_body_is_byte_exact() {
        let provider = ProviderConfig::builtin(ProviderId::OpenAI);
        let req = build_request(&provider, "gpt-4o", Some("sk-test"), &user_turn(), "...").unwrap();
        assert_eq!(
            req.body,
            r#"{"model":"gpt-4o","messages":[{"role":"system","content":"..."},{"role":"user","content":"hi"}],"stream":true}"#
        );
        assert_eq!(req.header("Authorization"), Some("Bearer sk-test"));
        assert_eq!(req.url, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_anthropic_body_has_top_level_system() {
        let provider = ProviderConfig::builtin(ProviderId::Anthropic);
        let req = build_request(
            &provider,
            "claude-3-5-sonnet-20241022",
            Some("key"),
            &user_turn(),
            "...",
        )
        .unwrap();
        assert_eq!(
            req.body,
            r#"{"model":"claude-3-5-sonnet-20241022","max_tokens":4096,"system":"...","messages":[{"role":"user","content":"hi"}],"stream":true}"#
        );
        assert_eq!(req.header("x-api-key"), Some("key"));
        assert_eq!(req.header("anthropic-version"), Some(ANTHROPIC_VERSION));
        assert_eq!(req.header("authorization"), None);
    }

    #[test]
    fn test_ollama_body_without_auth() {
        let provider = ProviderConfig::builtin(ProviderId::Ollama);
        let req = build_request(&provider, "gemma3", None, &user_turn(), "...").unwrap();
        assert_eq!(
            req.body,
            r#"{"model":"gemma3","messages":[{"role":"system","content":"..."},{"role":"user","content":"hi"}],"stream":true}"#
        );
        assert_eq!(req.header("authorization"), None);
        assert_eq!(req.header("x-api-key"), None);
    }

    #[test]
    fn test_bodies_are_deterministic() {
        let provider = ProviderConfig::builtin(ProviderId::Anthropic);
        let a = build_request(&provider, "m", Some("k"), &user_turn(), "sys").unwrap();
        let b = build_request(&provider, "m", Some("k"), &user_turn(), "sys").unwrap();
        assert_eq!(a.body, b.body);
    }

    #[test]
    fn test_anthropic_merges_system_history() {
        let provider = ProviderConfig::builtin(ProviderId::Anthropic);
        let history = vec![
            ChatMessage::user("task"),
            ChatMessage::system("step budget exhausted"),
            ChatMessage::assistant("ok"),
        ];
        let req = build_request(&provider, "m", Some("k"), &history, "prompt").unwrap();
        let v: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(v["system"], "prompt\n\nstep budget exhausted");
        assert_eq!(v["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_token_is_not_configured() {
        let provider = ProviderConfig::builtin(ProviderId::OpenAI);
        let err = build_request(&provider, "gpt-4o", Some("  "), &user_turn(), "").unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured(_)));
    }

    #[test]
    fn test_custom_needs_endpoint_but_not_token() {
        let provider = ProviderConfig::builtin(ProviderId::Custom);
        let err = build_request(&provider, "m", None, &user_turn(), "").unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured(_)));

        let provider = provider.with_endpoint("http://127.0.0.1:9/v1/chat/completions");
        let req = build_request(&provider, "m", None, &user_turn(), "").unwrap();
        assert_eq!(req.header("authorization"), None);
        // Empty prompt adds no system message
        assert_eq!(
            req.body,
            r#"{"model":"m","messages":[{"role":"user","content":"hi"}],"stream":true}"#
        );
    }
}
