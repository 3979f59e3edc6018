//! Provider table: endpoints, auth schemes and request shapes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Known chat providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    Anthropic,
    XAI,
    Ollama,
    Zen,
    Custom,
}

/// How the API token is attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `x-api-key: <token>` plus an `anthropic-version` header
    XApiKey,
    /// No authentication (local endpoints)
    None,
}

/// Vendor request/response family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    OpenAiChat,
    AnthropicMessages,
    OllamaChat,
}

impl ProviderId {
    pub fn all() -> [ProviderId; 6] {
        [
            ProviderId::OpenAI,
            ProviderId::Anthropic,
            ProviderId::XAI,
            ProviderId::Ollama,
            ProviderId::Zen,
            ProviderId::Custom,
        ]
    }

    /// Stable identifier used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::XAI => "xai",
            ProviderId::Ollama => "ollama",
            ProviderId::Zen => "zen",
            ProviderId::Custom => "custom",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OpenAI (GPT-4o)",
            ProviderId::Anthropic => "Anthropic (Claude)",
            ProviderId::XAI => "xAI (Grok)",
            ProviderId::Ollama => "Ollama (local)",
            ProviderId::Zen => "Zen API",
            ProviderId::Custom => "Custom endpoint",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "gpt-4o",
            ProviderId::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderId::XAI => "grok-3",
            ProviderId::Ollama => "gemma3",
            ProviderId::Zen => "anthropic/claude-sonnet-4-5",
            ProviderId::Custom => "custom-model",
        }
    }

    /// Built-in chat endpoint. Empty for `Custom`, which needs an override.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "https://api.openai.com/v1/chat/completions",
            ProviderId::Anthropic => "https://api.anthropic.com/v1/messages",
            ProviderId::XAI => "https://api.x.ai/v1/chat/completions",
            ProviderId::Ollama => "http://localhost:11434/api/chat",
            ProviderId::Zen => "https://api.opencode.ai/v1/chat/completions",
            ProviderId::Custom => "",
        }
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        match self {
            ProviderId::Anthropic => AuthScheme::XApiKey,
            ProviderId::Ollama => AuthScheme::None,
            _ => AuthScheme::Bearer,
        }
    }

    pub fn request_shape(&self) -> RequestShape {
        match self {
            ProviderId::Anthropic => RequestShape::AnthropicMessages,
            ProviderId::Ollama => RequestShape::OllamaChat,
            _ => RequestShape::OpenAiChat,
        }
    }

    /// Whether a request without a token should be refused before sending
    pub fn requires_token(&self) -> bool {
        !matches!(self, ProviderId::Ollama | ProviderId::Custom)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ProviderId::all()
            .into_iter()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| {
                let known: Vec<&str> = ProviderId::all().iter().map(|p| p.as_str()).collect();
                format!("unknown provider '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Immutable description of the provider a session talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub chat_endpoint_url: String,
    pub auth_scheme: AuthScheme,
    pub request_shape: RequestShape,
    pub default_model: String,
}

impl ProviderConfig {
    /// Provider with its built-in endpoint and default model
    pub fn builtin(id: ProviderId) -> Self {
        Self {
            id,
            chat_endpoint_url: id.default_endpoint().to_string(),
            auth_scheme: id.auth_scheme(),
            request_shape: id.request_shape(),
            default_model: id.default_model().to_string(),
        }
    }

    /// Replace the endpoint (custom endpoints, proxies, local test servers)
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.chat_endpoint_url = url.into().trim().to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}
