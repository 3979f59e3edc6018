//! read_file tool

use async_trait::async_trait;
use tracing::debug;

use crate::tools::{SecurityLevel, Tool, ToolContext, ToolFailure, ToolFailureKind, ToolResult};

/// Tool for reading file contents
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file and return them unchanged."
    }

    fn input_format(&self) -> &str {
        "<path>"
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Safe
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        let path_str = input.trim();
        if path_str.is_empty() {
            return Err(ToolFailure::invalid_input("expected a file path"));
        }
        let path = ctx.resolve_path(path_str);
        debug!(path = %path.display(), "Reading file");

        if path.is_dir() {
            return Err(ToolFailure::new(
                ToolFailureKind::Io,
                format!("{} is a directory, not a file", path.display()),
            ));
        }

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolFailure::from_io(&e, &path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_exact_contents() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("f.txt"), "hello\nworld\n").unwrap();

        let ctx = ToolContext::new(temp_dir.path().to_path_buf());
        let result = ReadFileTool.execute("f.txt\n", &ctx).await;
        assert_eq!(result, Ok("hello\nworld\n".to_string()));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());
        let failure = ReadFileTool.execute("nope.txt", &ctx).await.unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::NotFound);
    }

    #[tokio::test]
    async fn test_read_directory() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());
        let failure = ReadFileTool.execute(".", &ctx).await.unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::Io);
    }

    #[tokio::test]
    async fn test_read_empty_input() {
        let failure = ReadFileTool.execute("  \n", &ToolContext::default()).await.unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::InvalidInput);
    }
}
