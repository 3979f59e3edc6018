//! qai: autonomous coding assistant for the terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use qai_cli::commands::{self, AgentOptions};
use qai_cli::config::Overrides;
use qai_cli::prompt::DEFAULT_PROMPT_FILE;
use qai_cli::{repl, TaskOutcome};
use qai_llm::ProviderId;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "qai")]
#[command(about = "Autonomous ReAct coding assistant", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the agent system prompt
    #[arg(long, global = true, default_value = DEFAULT_PROMPT_FILE)]
    prompt: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, clap::Args)]
struct ProviderArgs {
    /// Provider id (openai, anthropic, xai, ollama, zen, custom)
    #[arg(long, env = "QAI_PROVIDER")]
    provider: Option<ProviderId>,

    /// Model to use (overrides config)
    #[arg(short, long, env = "QAI_MODEL")]
    model: Option<String>,

    /// API token for this invocation
    #[arg(long, env = "QAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl ProviderArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            provider: self.provider,
            model: self.model.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

#[derive(Debug, clap::Args)]
struct AgentArgs {
    #[command(flatten)]
    provider: ProviderArgs,

    /// Maximum think/act/observe steps
    #[arg(long)]
    max_steps: Option<usize>,

    /// Directory tools operate in
    #[arg(short = 'C', long)]
    dir: Option<PathBuf>,

    /// Hide the model's <think> reasoning
    #[arg(long)]
    hide_thinking: bool,
}

impl AgentArgs {
    fn options(&self, prompt: PathBuf) -> AgentOptions {
        AgentOptions {
            prompt,
            overrides: self.provider.overrides(),
            max_steps: self.max_steps,
            working_dir: self.dir.clone(),
            show_thinking: !self.hide_thinking,
        }
    }

    /// Defaults plus environment overrides, for the bare `qai` invocation
    fn parse_default() -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            provider: ProviderArgs {
                provider: env("QAI_PROVIDER").and_then(|p| p.parse().ok()),
                model: env("QAI_MODEL"),
                api_key: env("QAI_API_KEY"),
            },
            max_steps: None,
            dir: None,
            hide_thinking: false,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show basic information about the agent prompt
    Info,
    /// Print the system prompt to stdout
    Show,
    /// Copy the system prompt to a destination file
    Copy {
        /// Destination path for the prompt file
        dest: PathBuf,
        /// Overwrite the destination if it already exists
        #[arg(long)]
        force: bool,
    },
    /// Validate that the prompt contains expected sections
    Validate,
    /// List the built-in tools
    Tools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one task to completion
    Run {
        /// The task to perform
        #[arg(required = true)]
        task: Vec<String>,

        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Start interactive chat REPL
    Chat {
        #[command(flatten)]
        agent: AgentArgs,
    },
    /// List models in the local Ollama
    Models {
        #[command(flatten)]
        provider: ProviderArgs,
    },
    /// Manage the user configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Create a commented default config file
    Init,
    /// Show the effective configuration (tokens masked)
    Show,
    /// Store an API token for a provider
    SetToken {
        provider: ProviderId,
        token: String,
    },
    /// Select the default provider
    SetProvider {
        provider: ProviderId,
        /// Default model for this provider
        #[arg(short, long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let prompt = cli.prompt;
    match cli.command {
        Some(Commands::Info) => commands::info(&prompt)?,
        Some(Commands::Show) => commands::show(&prompt)?,
        Some(Commands::Copy { dest, force }) => commands::copy(&prompt, &dest, force)?,
        Some(Commands::Validate) => commands::validate(&prompt)?,
        Some(Commands::Tools { json }) => commands::tools(json)?,
        Some(Commands::Run { task, agent }) => {
            let outcome = commands::run(&agent.options(prompt), &task.join(" ")).await?;
            if let TaskOutcome::Failed { .. } = outcome {
                return Ok(ExitCode::FAILURE);
            }
        }
        Some(Commands::Chat { agent }) => repl::run(agent.options(prompt)).await?,
        Some(Commands::Models { provider }) => commands::models(&provider.overrides()).await?,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => commands::config_init()?,
            ConfigAction::Show => commands::config_show()?,
            ConfigAction::SetToken { provider, token } => commands::config_set_token(provider, &token)?,
            ConfigAction::SetProvider { provider, model } => commands::config_set_provider(provider, model)?,
        },
        None => {
            // Default to chat REPL when no command specified
            let args = AgentArgs::parse_default();
            repl::run(args.options(prompt)).await?
        }
    }

    Ok(ExitCode::SUCCESS)
}
