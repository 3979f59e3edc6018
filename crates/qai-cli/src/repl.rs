//! Interactive REPL
//!
//! Every entered line is a separate task with a fresh session. Slash
//! commands control the REPL itself.

use std::path::PathBuf;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::agent::AgentLoop;
use crate::commands::{build_agent, run_task, AgentOptions};
use crate::config::UserConfig;
use crate::render::{BLUE, BOLD, CYAN, DIM, GREEN, RESET, YELLOW};
use crate::tools::builtin_tools;

/// What a slash command asks the REPL to do
#[derive(Debug, Clone, PartialEq, Eq)]
enum SlashCommand {
    Help,
    Exit,
    Tools,
    ToggleThinking,
    Unknown(String),
}

fn parse_slash(line: &str) -> SlashCommand {
    let cmd = line.split_whitespace().next().unwrap_or("");
    match cmd {
        "/help" | "/?" => SlashCommand::Help,
        "/exit" | "/quit" | "/q" => SlashCommand::Exit,
        "/tools" => SlashCommand::Tools,
        "/thinking" => SlashCommand::ToggleThinking,
        other => SlashCommand::Unknown(other.to_string()),
    }
}

struct ReplState {
    agent: AgentLoop,
    show_thinking: bool,
}

fn history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("qai").join("history.txt"))
}

/// Run the interactive REPL
pub async fn run(opts: AgentOptions) -> Result<()> {
    let config = UserConfig::load()?;
    let resolved = config.resolve(&opts.overrides);
    let mut state = ReplState {
        agent: build_agent(&config, &opts)?,
        show_thinking: opts.show_thinking,
    };

    let mut rl = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    print_welcome(resolved.provider.id.label(), &resolved.model);

    loop {
        let prompt = format!("{}qai>{} ", CYAN, RESET);

        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if line.starts_with('/') {
                    if handle_slash_command(&mut state, line) {
                        break;
                    }
                    continue;
                }

                run_task(&state.agent, line, state.show_thinking).await;
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}^C{}", DIM, RESET);
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("{}Goodbye!{}", DIM, RESET);
                break;
            }
            Err(e) => {
                eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(path);
    }

    Ok(())
}

/// Returns true when the REPL should exit
fn handle_slash_command(state: &mut ReplState, line: &str) -> bool {
    match parse_slash(line) {
        SlashCommand::Exit => return true,
        SlashCommand::Help => print_help(),
        SlashCommand::Tools => {
            for tool in builtin_tools() {
                println!("  {}{}{} {}", BLUE, tool.name, RESET, tool.description);
            }
        }
        SlashCommand::ToggleThinking => {
            state.show_thinking = !state.show_thinking;
            let mode = if state.show_thinking { "shown" } else { "hidden" };
            println!("{}Reasoning {}{}", DIM, mode, RESET);
        }
        SlashCommand::Unknown(cmd) => {
            eprintln!("{}Unknown command:{} {} (try /help)", YELLOW, RESET, cmd);
        }
    }
    false
}

fn print_welcome(provider: &str, model: &str) {
    println!("{}qai{} {}v{}{}", BOLD, RESET, DIM, env!("CARGO_PKG_VERSION"), RESET);
    println!("Provider: {}{}{}  Model: {}{}{}", GREEN, provider, RESET, GREEN, model, RESET);
    println!(
        "{}Type a task. Ctrl-C twice cancels a running task. /help for commands.{}",
        DIM, RESET
    );
    println!();
}

fn print_help() {
    println!("{}Commands{}", BOLD, RESET);
    println!("  /help      Show this help");
    println!("  /tools     List built-in tools");
    println!("  /thinking  Show or hide model reasoning");
    println!("  /exit      Leave the REPL");
}
