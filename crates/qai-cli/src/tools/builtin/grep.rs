//! grep_search tool

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::tools::{SecurityLevel, Tool, ToolContext, ToolFailure, ToolFailureKind, ToolResult};

/// Maximum number of matching lines returned
const MAX_MATCHES: usize = 200;

/// Directories never worth searching
const SKIP_DIRS: [&str; 5] = [".git", "node_modules", "target", ".venv", "__pycache__"];

/// Tool for searching file contents
pub struct GrepSearchTool;

/// Parsed `pattern\n[path]\n[glob]`
struct GrepRequest<'a> {
    pattern: &'a str,
    path: &'a str,
    glob: Option<&'a str>,
}

fn parse_request(input: &str) -> Result<GrepRequest<'_>, ToolFailure> {
    let mut lines = input.trim_start_matches('\n').splitn(3, '\n');
    let pattern = lines.next().unwrap_or("").trim();
    if pattern.is_empty() {
        return Err(ToolFailure::invalid_input("pattern must not be empty"));
    }
    let path = lines.next().map(str::trim).filter(|p| !p.is_empty()).unwrap_or(".");
    let glob = lines.next().map(str::trim).filter(|g| !g.is_empty());
    Ok(GrepRequest { pattern, path, glob })
}

fn search_file(path: &Path, regex: &Regex, matches: &mut Vec<String>, working_dir: &Path) {
    // Binary or unreadable files are skipped
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };

    let display_path = path.strip_prefix(working_dir).unwrap_or(path);

    for (line_num, line) in content.lines().enumerate() {
        if regex.is_match(line) {
            matches.push(format!("{}:{}:{}", display_path.display(), line_num + 1, line.trim_end()));
            if matches.len() > MAX_MATCHES {
                return;
            }
        }
    }
}

fn run_search(request: &GrepRequest<'_>, root: &Path, working_dir: &Path) -> ToolResult {
    let regex = Regex::new(request.pattern).map_err(|e| {
        warn!(pattern = %request.pattern, error = %e, "Invalid regex pattern");
        ToolFailure::invalid_input(format!("invalid regex pattern: {}", e))
    })?;
    let glob = request
        .glob
        .map(glob::Pattern::new)
        .transpose()
        .map_err(|e| ToolFailure::invalid_input(format!("invalid glob pattern: {}", e)))?;

    let mut matches = Vec::new();
    if root.is_file() {
        search_file(root, &regex, &mut matches, working_dir);
    } else if root.is_dir() {
        let entries = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && e.depth() > 0
                    && e.file_name().to_str().is_some_and(|n| SKIP_DIRS.contains(&n)))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());

        for entry in entries {
            if let Some(ref glob) = glob {
                let name = entry.file_name().to_string_lossy();
                if !glob.matches(&name) {
                    continue;
                }
            }
            search_file(entry.path(), &regex, &mut matches, working_dir);
            if matches.len() > MAX_MATCHES {
                break;
            }
        }
    } else {
        return Err(ToolFailure::new(
            ToolFailureKind::NotFound,
            format!("path not found: {}", root.display()),
        ));
    }

    if matches.is_empty() {
        return Ok(format!("No matches found for '{}'", request.pattern));
    }
    let truncated = matches.len() > MAX_MATCHES;
    matches.truncate(MAX_MATCHES);
    let mut output = matches.join("\n");
    if truncated {
        output.push_str(&format!("\n[... output truncated to {} lines]", MAX_MATCHES));
    }
    Ok(output)
}

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search file contents with a regex. Returns path:line:text for each match, at most 200 lines."
    }

    fn input_format(&self) -> &str {
        "<pattern>\\n[path]\\n[file glob, e.g. *.rs]"
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Safe
    }

    #[instrument(skip(self, input, ctx))]
    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        let request = parse_request(input)?;
        let root: PathBuf = ctx.resolve_path(request.path);
        debug!(pattern = %request.pattern, root = %root.display(), glob = ?request.glob, "Grep parameters");

        let pattern = request.pattern.to_string();
        let path = request.path.to_string();
        let glob = request.glob.map(str::to_string);
        let working_dir = ctx.working_dir.clone();

        // Directory walks are blocking IO
        tokio::task::spawn_blocking(move || {
            let request = GrepRequest {
                pattern: &pattern,
                path: &path,
                glob: glob.as_deref(),
            };
            run_search(&request, &root, &working_dir)
        })
        .await
        .map_err(|e| ToolFailure::new(ToolFailureKind::Io, format!("search task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ToolContext) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("target/debug")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {\n    run();\n}\n").unwrap();
        std::fs::write(root.join("src/lib.rs"), "pub fn run() {}\n").unwrap();
        std::fs::write(root.join("notes.md"), "run the tests\n").unwrap();
        std::fs::write(root.join("target/debug/out.rs"), "fn run() {}\n").unwrap();
        let ctx = ToolContext::new(root.to_path_buf());
        (temp_dir, ctx)
    }

    #[tokio::test]
    async fn test_grep_with_glob() {
        let (_dir, ctx) = setup();
        let output = GrepSearchTool.execute("fn run\n.\n*.rs", &ctx).await.unwrap();
        assert_eq!(output, format!("{}:1:pub fn run() {{}}", Path::new("src").join("lib.rs").display()));
    }

    #[tokio::test]
    async fn test_grep_defaults_to_working_dir() {
        let (_dir, ctx) = setup();
        let output = GrepSearchTool.execute("run", &ctx).await.unwrap();
        assert!(output.contains("notes.md:1:run the tests"));
        assert!(output.contains("main.rs:2:"));
        assert!(!output.contains("target"));
    }

    #[tokio::test]
    async fn test_grep_no_matches() {
        let (_dir, ctx) = setup();
        let output = GrepSearchTool.execute("nothing_here", &ctx).await.unwrap();
        assert!(output.starts_with("No matches found"));
    }

    #[tokio::test]
    async fn test_grep_caps_output() {
        let temp_dir = TempDir::new().unwrap();
        let body: String = (0..500).map(|i| format!("hit {}\n", i)).collect();
        std::fs::write(temp_dir.path().join("big.txt"), body).unwrap();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());

        let output = GrepSearchTool.execute("hit", &ctx).await.unwrap();
        assert_eq!(output.lines().count(), MAX_MATCHES + 1);
        assert!(output.ends_with("[... output truncated to 200 lines]"));
    }

    #[tokio::test]
    async fn test_grep_invalid_regex() {
        let failure = GrepSearchTool
            .execute("(unclosed", &ToolContext::default())
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_grep_missing_path() {
        let (_dir, ctx) = setup();
        let failure = GrepSearchTool.execute("x\nno/such/dir", &ctx).await.unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::NotFound);
    }
}
