//! The agent's system prompt file
//!
//! The prompt is an opaque text blob. These helpers back the `info`, `show`,
//! `copy` and `validate` subcommands and load it for the agent.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Default prompt file, relative to the working directory
pub const DEFAULT_PROMPT_FILE: &str = "qa-agent-system-prompt.md";

/// Headings a usable prompt must contain
pub const REQUIRED_SECTIONS: [&str; 3] = [
    "## ENVIRONMENT",
    "### PRIMARY OBJECTIVE",
    "### MODE SELECTION PRIMER",
];

pub fn read_prompt(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read prompt at {}", path.display()))
}

/// Prompt text for the agent, or empty when the file is absent
pub fn load_or_empty(path: &Path) -> Result<String> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Prompt file not found, running with tool instructions only");
        return Ok(String::new());
    }
    read_prompt(path)
}

/// Lines printed by `info`
pub fn info_lines(path: &Path) -> Vec<String> {
    vec![
        "qai".to_string(),
        format!("Prompt path: {}", path.display()),
        format!("Prompt exists: {}", path.exists()),
        format!("Version: {}", env!("CARGO_PKG_VERSION")),
    ]
}

/// Copy the prompt to `dest`; refuses to overwrite unless `force`
pub fn copy_prompt(path: &Path, dest: &Path, force: bool) -> Result<()> {
    if dest.exists() && !force {
        bail!(
            "Destination already exists. Use --force to overwrite: {}",
            dest.display()
        );
    }
    let content = read_prompt(path)?;
    fs::write(dest, content).with_context(|| format!("Failed to write to {}", dest.display()))?;
    Ok(())
}

/// Required sections absent from `content`
pub fn missing_sections(content: &str) -> Vec<&'static str> {
    REQUIRED_SECTIONS
        .into_iter()
        .filter(|marker| !content.contains(marker))
        .collect()
}

pub fn validate_prompt(path: &Path) -> Result<()> {
    let content = read_prompt(path)?;
    let missing = missing_sections(&content);
    if !missing.is_empty() {
        bail!(
            "Prompt validation failed. Missing sections: {}",
            missing.join(", ")
        );
    }
    Ok(())
}
