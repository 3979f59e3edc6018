//! CLI commands implementation

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use qai_llm::{ChatClient, ProviderId};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::{events, AgentLoop, TaskOutcome};
use crate::cancel::{watch_ctrl_c, CancelGate, CancelSignal};
use crate::config::{Overrides, UserConfig};
use crate::prompt;
use crate::render::{self, BLUE, BOLD, CYAN, DIM, GREEN, RED, RESET, YELLOW};
use crate::tools::registry::ToolRegistry;
use crate::tools::router::ToolRouter;
use crate::tools::{builtin_tools, SecurityLevel, ToolInfo};

fn print_status(ok: bool, msg: &str) {
    let icon = if ok {
        format!("{}✓{}", GREEN, RESET)
    } else {
        format!("{}✗{}", RED, RESET)
    };
    println!("  {} {}", icon, msg);
}

/// Options shared by `run` and `chat`
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub prompt: PathBuf,
    pub overrides: Overrides,
    pub max_steps: Option<usize>,
    pub working_dir: Option<PathBuf>,
    pub show_thinking: bool,
}

pub fn info(prompt_path: &Path) -> Result<()> {
    for line in prompt::info_lines(prompt_path) {
        println!("{}", line);
    }
    Ok(())
}

pub fn show(prompt_path: &Path) -> Result<()> {
    let content = prompt::read_prompt(prompt_path)?;
    print!("{}", content);
    io::stdout().flush().ok();
    Ok(())
}

pub fn copy(prompt_path: &Path, dest: &Path, force: bool) -> Result<()> {
    prompt::copy_prompt(prompt_path, dest, force)?;
    println!("Copied prompt to {}", dest.display());
    Ok(())
}

pub fn validate(prompt_path: &Path) -> Result<()> {
    prompt::validate_prompt(prompt_path)?;
    println!("Prompt validation passed.");
    Ok(())
}

/// Print the built-in tools
pub fn tools(json: bool) -> Result<()> {
    let tools = builtin_tools();
    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
    } else {
        print!("{}", format_tool_listing(&tools));
    }
    Ok(())
}

fn format_tool_listing(tools: &[ToolInfo]) -> String {
    let mut out = format!("{}Built-in tools{}\n", BOLD, RESET);
    for tool in tools {
        let level = match tool.security_level {
            SecurityLevel::Safe => format!("{}safe{}", GREEN, RESET),
            SecurityLevel::Moderate => format!("{}moderate{}", YELLOW, RESET),
            SecurityLevel::Dangerous => format!("{}dangerous{}", RED, RESET),
        };
        out.push_str(&format!("\n  {}{}{} [{}]\n", CYAN, tool.name, RESET, level));
        out.push_str(&format!("    {}\n", tool.description));
        if !tool.input_format.is_empty() {
            out.push_str(&format!("    {}input: {}{}\n", DIM, tool.input_format.replace('\n', "\\n"), RESET));
        }
    }
    out
}

/// Build the agent from user config plus overrides
pub fn build_agent(config: &UserConfig, opts: &AgentOptions) -> Result<AgentLoop> {
    let resolved = config.resolve(&opts.overrides);
    info!(provider = %resolved.provider.id, model = %resolved.model, "Using provider");

    let client = ChatClient::new(
        resolved.provider,
        resolved.model,
        resolved.token,
        config.transport_config(),
    )
    .context("Failed to create HTTP client")?;

    let working_dir = match &opts.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };
    let mut agent_config = config
        .agent_config()
        .with_system_prompt(prompt::load_or_empty(&opts.prompt)?)
        .with_working_dir(working_dir);
    if let Some(max) = opts.max_steps {
        agent_config = agent_config.with_max_steps(max);
    }

    let router = Arc::new(ToolRouter::new(ToolRegistry::with_builtins()));
    Ok(AgentLoop::new(Arc::new(client), router, agent_config))
}

/// Run one task with live rendering and double Ctrl-C cancellation
pub async fn run_task(agent: &AgentLoop, task: &str, show_thinking: bool) -> TaskOutcome {
    let cancel = CancellationToken::new();
    let watcher = watch_ctrl_c(CancelGate::new(cancel.clone()), |signal| match signal {
        CancelSignal::Armed => eprintln!("\n{}Press Ctrl-C again within 1s to cancel{}", YELLOW, RESET),
        CancelSignal::Confirmed => eprintln!("\n{}Cancelling...{}", YELLOW, RESET),
    });

    let (tx, rx) = events::channel();
    let renderer = render::spawn_stdout(rx, show_thinking);

    let (outcome, session) = agent.run(task, &cancel, &tx).await;
    drop(tx);
    let _ = renderer.await;
    watcher.abort();

    info!(session = %session.id(), steps = session.step_count(), "Task finished");
    outcome
}

/// `qai run <task>`
pub async fn run(opts: &AgentOptions, task: &str) -> Result<TaskOutcome> {
    let task = task.trim();
    if task.is_empty() {
        anyhow::bail!("No task given");
    }
    let config = UserConfig::load()?;
    let agent = build_agent(&config, opts)?;
    Ok(run_task(&agent, task, opts.show_thinking).await)
}

/// List models in the local Ollama
pub async fn models(overrides: &Overrides) -> Result<()> {
    let config = UserConfig::load()?;
    let mut resolved = config.resolve(overrides);
    if resolved.provider.id != ProviderId::Ollama {
        resolved = config.resolve(&Overrides {
            provider: Some(ProviderId::Ollama),
            ..Default::default()
        });
    }

    let client = ChatClient::new(resolved.provider, resolved.model, None, config.transport_config())?;
    let models = match client.list_local_models().await {
        Ok(models) => models,
        Err(e) if e.is_network() => {
            println!("{}Ollama not running - can't list models{}", YELLOW, RESET);
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to list models"),
    };

    println!("{}Local models{}", BOLD, RESET);
    if models.is_empty() {
        println!("  {}(none){}", DIM, RESET);
    }
    let mut sorted = models;
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    for m in sorted {
        let size_gb = m.size as f64 / 1_000_000_000.0;
        println!("  - {}{}{} {}({:.1} GB){}", BLUE, m.name, RESET, DIM, size_gb, RESET);
    }
    Ok(())
}

pub fn config_init() -> Result<()> {
    let path = UserConfig::config_path()?;
    UserConfig::create_default(&path)?;
    println!("{}✓{} Created config at {}", GREEN, RESET, path.display());
    Ok(())
}

pub fn config_show() -> Result<()> {
    let path = UserConfig::config_path()?;
    let config = UserConfig::load()?;

    println!("{}Config file:{} {}", BOLD, RESET, path.display());
    print_status(path.exists(), if path.exists() { "exists" } else { "not created (using defaults)" });

    let resolved = config.resolve(&Overrides::default());
    println!();
    println!("Provider: {} ({})", resolved.provider.id.label(), resolved.provider.id);
    println!("Model:    {}", resolved.model);
    println!("Endpoint: {}", resolved.provider.chat_endpoint_url);
    print_status(
        resolved.token.is_some() || !resolved.provider.id.requires_token(),
        if resolved.token.is_some() { "token configured" } else { "no token" },
    );
    println!();
    print!("{}", config.to_masked_toml()?);
    Ok(())
}

pub fn config_set_token(provider: ProviderId, token: &str) -> Result<()> {
    let mut config = UserConfig::load()?;
    let path = config.set_token(provider, token)?;
    println!("{}✓{} Saved {} token to {}", GREEN, RESET, provider.label(), path.display());
    Ok(())
}

pub fn config_set_provider(provider: ProviderId, model: Option<String>) -> Result<()> {
    let mut config = UserConfig::load()?;
    let path = config.set_provider(provider, model)?;
    let resolved = config.resolve(&Overrides::default());
    println!(
        "{}✓{} Provider set to {} ({}) in {}",
        GREEN,
        RESET,
        provider.label(),
        resolved.model,
        path.display()
    );
    if provider.requires_token() && resolved.token.is_none() {
        println!(
            "{}No token stored yet:{} qai config set-token {} <token>",
            YELLOW, RESET, provider
        );
    }
    Ok(())
}
