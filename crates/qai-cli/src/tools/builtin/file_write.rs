//! write_file tool

use async_trait::async_trait;
use tracing::debug;

use crate::tools::{SecurityLevel, Tool, ToolContext, ToolFailure, ToolResult};

/// Tool for creating or overwriting files
pub struct WriteFileTool;

/// Split `path\ncontent`. Content is taken verbatim after the first newline.
pub(crate) fn split_path_content(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    let (path, content) = input.split_once('\n')?;
    let path = path.trim();
    if path.is_empty() {
        None
    } else {
        Some((path, content))
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given content, creating parent directories as needed."
    }

    fn input_format(&self) -> &str {
        "<path>\\n<content>"
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        let (path_str, content) = split_path_content(input)
            .ok_or_else(|| ToolFailure::invalid_input("input must be '<path>\\n<content>'"))?;
        let path = ctx.resolve_path(path_str);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ToolFailure::from_io(&e, parent))?;
            }
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolFailure::from_io(&e, &path))?;

        debug!(path = %path.display(), bytes = content.len(), "File written");
        Ok(format!("Wrote {} bytes to {}", content.len(), path_str))
    }
}
