//! User configuration for qai
//!
//! Configuration file: ~/.config/qai/config.toml (or platform equivalent)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use qai_llm::{ProviderConfig, ProviderId, TransportConfig};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentConfig, DEFAULT_MAX_STEPS};

/// User configuration for the qai CLI
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserConfig {
    #[serde(default)]
    pub provider: ProviderSection,

    /// API tokens keyed by provider id
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,

    /// Endpoint overrides keyed by provider id
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,

    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub network: NetworkSection,

    /// File this config was loaded from
    #[serde(skip)]
    path: Option<PathBuf>,
}

/// Selected provider and model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSection {
    #[serde(default = "default_provider")]
    pub id: ProviderId,

    /// Overrides the provider's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,

    #[serde(default = "default_max_output_len")]
    pub max_output_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_provider() -> ProviderId {
    ProviderId::Ollama
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_shell_timeout_secs() -> u64 {
    60
}

fn default_max_output_len() -> usize {
    50_000
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    120
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            id: default_provider(),
            model: None,
        }
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            shell_timeout_secs: default_shell_timeout_secs(),
            max_output_len: default_max_output_len(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

/// Per-invocation overrides from flags or environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<ProviderId>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Everything needed to build a chat client
#[derive(Clone)]
pub struct ResolvedProvider {
    pub provider: ProviderConfig,
    pub model: String,
    pub token: Option<String>,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider", &self.provider.id)
            .field("model", &self.model)
            .field("token", &self.token.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl UserConfig {
    /// Load user configuration from default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        } else {
            Self::default()
        };
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save to the file this config came from, or the default location
    pub fn save(&self) -> Result<PathBuf> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => Self::config_path()?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).with_context(|| format!("Failed to write config to {}", path.display()))?;
        restrict_permissions(&path);

        Ok(path)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("qai").join("config.toml"))
    }

    /// Create a default configuration file with comments
    pub fn create_default(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let default_config = r#"# qai configuration
# Location: ~/.config/qai/config.toml

[provider]
# One of: openai, anthropic, xai, ollama, zen, custom
id = "ollama"
# model = "gemma3"

[tokens]
# openai = "sk-..."
# anthropic = "sk-ant-..."

[endpoints]
# custom = "http://localhost:8080/v1/chat/completions"
# ollama = "http://gpu-box:11434/api/chat"

[agent]
max_steps = 15
shell_timeout_secs = 60
max_output_len = 50000

[network]
connect_timeout_secs = 5
read_timeout_secs = 120
"#;

        fs::write(path, default_config)?;
        Ok(())
    }

    /// Store a token and write the file immediately
    pub fn set_token(&mut self, provider: ProviderId, token: &str) -> Result<PathBuf> {
        let token = token.trim();
        if token.is_empty() {
            self.tokens.remove(provider.as_str());
        } else {
            self.tokens.insert(provider.as_str().to_string(), token.to_string());
        }
        self.save()
    }

    /// Select a provider (and optionally model) and write the file
    pub fn set_provider(&mut self, provider: ProviderId, model: Option<String>) -> Result<PathBuf> {
        self.provider = ProviderSection { id: provider, model };
        self.save()
    }

    pub fn token_for(&self, provider: ProviderId) -> Option<&str> {
        self.tokens
            .get(provider.as_str())
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
    }

    /// Built-in provider entry with this user's endpoint override applied
    pub fn provider_config(&self, provider: ProviderId) -> ProviderConfig {
        let config = ProviderConfig::builtin(provider);
        match self.endpoints.get(provider.as_str()) {
            Some(url) if !url.trim().is_empty() => config.with_endpoint(url.as_str()),
            _ => config,
        }
    }

    /// Apply overrides: flag/env first, then this file, then built-ins
    pub fn resolve(&self, overrides: &Overrides) -> ResolvedProvider {
        let id = overrides.provider.unwrap_or(self.provider.id);
        let provider = self.provider_config(id);

        // The file's model belongs to the file's provider
        let file_model = if id == self.provider.id {
            self.provider.model.clone()
        } else {
            None
        };
        let model = overrides
            .model
            .clone()
            .or(file_model)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model.clone());

        let token = overrides
            .api_key
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.token_for(id).map(str::to_string));

        ResolvedProvider { provider, model, token }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(self.network.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.network.read_timeout_secs),
        }
    }

    /// Agent settings from the file; prompt and working directory are set
    /// by the caller
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig::default()
            .with_max_steps(self.agent.max_steps)
            .with_shell_timeout(Duration::from_secs(self.agent.shell_timeout_secs))
            .with_max_output_len(self.agent.max_output_len)
    }

    /// Render for display with tokens masked
    pub fn to_masked_toml(&self) -> Result<String> {
        let mut masked = self.clone();
        for token in masked.tokens.values_mut() {
            *token = mask_token(token);
        }
        Ok(toml::to_string_pretty(&masked)?)
    }
}

fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 8 {
        return "****".to_string();
    }
    format!("{}****", visible)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!(path = %path.display(), error = %e, "Could not restrict config permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = UserConfig::default();
        assert_eq!(config.provider.id, ProviderId::Ollama);
        assert_eq!(config.agent.max_steps, 15);
        assert_eq!(config.network.read_timeout_secs, 120);
        assert_eq!(config.transport_config(), TransportConfig::default());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[provider]
id = "anthropic"
model = "claude-3-5-haiku-latest"

[tokens]
anthropic = "sk-ant-123"

[agent]
max_steps = 5
"#;

        let config: UserConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.provider.id, ProviderId::Anthropic);
        assert_eq!(config.token_for(ProviderId::Anthropic), Some("sk-ant-123"));
        assert_eq!(config.token_for(ProviderId::OpenAI), None);
        assert_eq!(config.agent.max_steps, 5);
        assert_eq!(config.agent.shell_timeout_secs, 60);
        assert_eq!(config.agent_config().max_steps, 5);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = UserConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.provider.id, ProviderId::Ollama);
        assert!(config.tokens.is_empty());
    }

    #[test]
    fn test_set_token_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qai").join("config.toml");

        let mut config = UserConfig::load_from(&path).unwrap();
        let written = config.set_token(ProviderId::OpenAI, " sk-test \n").unwrap();
        assert_eq!(written, path);

        let reloaded = UserConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.token_for(ProviderId::OpenAI), Some("sk-test"));
    }

    #[test]
    fn test_create_default_parses() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        UserConfig::create_default(&path).unwrap();
        assert!(UserConfig::create_default(&path).is_err());

        let config = UserConfig::load_from(&path).unwrap();
        assert_eq!(config.provider.id, ProviderId::Ollama);
        assert_eq!(config.agent.max_output_len, 50_000);
    }

    #[test]
    fn test_resolve_precedence() {
        let mut config = UserConfig::default();
        config.provider = ProviderSection {
            id: ProviderId::OpenAI,
            model: Some("gpt-4o-mini".into()),
        };
        config.tokens.insert("openai".into(), "file-token".into());

        let resolved = config.resolve(&Overrides::default());
        assert_eq!(resolved.provider.id, ProviderId::OpenAI);
        assert_eq!(resolved.model, "gpt-4o-mini");
        assert_eq!(resolved.token.as_deref(), Some("file-token"));

        let resolved = config.resolve(&Overrides {
            api_key: Some("env-token".into()),
            model: Some("gpt-4.1".into()),
            ..Default::default()
        });
        assert_eq!(resolved.model, "gpt-4.1");
        assert_eq!(resolved.token.as_deref(), Some("env-token"));

        // Switching provider drops the file's model and token
        let resolved = config.resolve(&Overrides {
            provider: Some(ProviderId::XAI),
            ..Default::default()
        });
        assert_eq!(resolved.model, "grok-3");
        assert_eq!(resolved.token, None);
    }

    #[test]
    fn test_endpoint_override() {
        let mut config = UserConfig::default();
        config
            .endpoints
            .insert("custom".into(), "http://localhost:8080/v1/chat/completions".into());
        let provider = config.provider_config(ProviderId::Custom);
        assert_eq!(provider.chat_endpoint_url, "http://localhost:8080/v1/chat/completions");
        assert_eq!(config.provider_config(ProviderId::Ollama).chat_endpoint_url, "http://localhost:11434/api/chat");
    }

    #[test]
    fn test_masked_output_hides_tokens() {
        let mut config = UserConfig::default();
        config.tokens.insert("openai".into(), "sk-abcdefghijklmnop".into());
        let shown = config.to_masked_toml().unwrap();
        assert!(shown.contains("sk-a****"));
        assert!(!shown.contains("abcdefghijklmnop"));
    }
}
