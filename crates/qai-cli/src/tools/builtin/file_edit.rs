//! edit_file tool: single exact search/replace

use async_trait::async_trait;
use tracing::debug;

use crate::tools::{SecurityLevel, Tool, ToolContext, ToolFailure, ToolFailureKind, ToolResult};

/// Tool for replacing exactly one occurrence of a text block in a file
pub struct EditFileTool;

/// A parsed edit request
#[derive(Debug, PartialEq, Eq)]
struct EditRequest<'a> {
    path: &'a str,
    search: &'a str,
    replacement: &'a str,
}

/// Parse `path\n<<<\nsearch\n===\nreplacement\n>>>`
fn parse_edit(input: &str) -> Result<EditRequest<'_>, ToolFailure> {
    let input = input.trim_start();
    let (path, rest) = input
        .split_once('\n')
        .ok_or_else(|| ToolFailure::invalid_input("expected '<path>' on the first line followed by a '<<<' block"))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(ToolFailure::invalid_input("missing file path"));
    }

    let body = rest
        .strip_prefix("<<<\n")
        .or_else(|| rest.strip_prefix("<<<\r\n"))
        .ok_or_else(|| ToolFailure::invalid_input("the line after the path must be '<<<'"))?;

    let (search, after) = if let Some(after) = body.strip_prefix("===\n") {
        ("", after)
    } else {
        let mid = body
            .find("\n===\n")
            .ok_or_else(|| ToolFailure::invalid_input("missing '===' separator"))?;
        (&body[..mid], &body[mid + "\n===\n".len()..])
    };
    if search.is_empty() {
        return Err(ToolFailure::invalid_input("search block must not be empty"));
    }

    let tail = after.trim_end();
    let replacement = tail
        .strip_suffix("\n>>>")
        .or_else(|| (tail == ">>>").then_some(""))
        .ok_or_else(|| ToolFailure::invalid_input("missing closing '>>>'"))?;

    Ok(EditRequest {
        path,
        search,
        replacement,
    })
}

/// Occurrences of `needle` in `haystack`, overlapping ones included,
/// counted up to `limit`.
fn count_occurrences(haystack: &str, needle: &str, limit: usize) -> usize {
    let mut count = 0;
    let mut start = 0;
    while count < limit {
        match haystack[start..].find(needle) {
            Some(pos) => {
                count += 1;
                let at = start + pos;
                // Advance one char so overlapping matches are seen
                start = at + haystack[at..].chars().next().map_or(1, char::len_utf8);
            }
            None => break,
        }
    }
    count
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace the single exact occurrence of a search block in a file. Fails without writing if the block occurs zero or several times."
    }

    fn input_format(&self) -> &str {
        "<path>\\n<<<\\n<search>\\n===\\n<replacement>\\n>>>"
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Dangerous
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        let edit = parse_edit(input)?;
        let path = ctx.resolve_path(edit.path);

        let original = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolFailure::from_io(&e, &path))?;

        match count_occurrences(&original, edit.search, 2) {
            0 => Err(ToolFailure::new(
                ToolFailureKind::NoMatch,
                format!("search block not found in {}", edit.path),
            )),
            1 => {
                let updated = original.replacen(edit.search, edit.replacement, 1);
                tokio::fs::write(&path, &updated)
                    .await
                    .map_err(|e| ToolFailure::from_io(&e, &path))?;
                debug!(path = %path.display(), "Edit applied");
                Ok(format!("Applied edit to {}", edit.path))
            }
            _ => Err(ToolFailure::new(
                ToolFailureKind::AmbiguousMatch,
                format!(
                    "search block occurs more than once in {}; include more surrounding lines",
                    edit.path
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(content: &str) -> (TempDir, ToolContext) {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("src.rs"), content).unwrap();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());
        (temp_dir, ctx)
    }

    fn read(dir: &TempDir) -> String {
        std::fs::read_to_string(dir.path().join("src.rs")).unwrap()
    }

    #[test]
    fn test_parse_edit() {
        let edit = parse_edit("src.rs\n<<<\nlet a = 1;\n===\nlet a = 2;\n>>>").unwrap();
        assert_eq!(
            edit,
            EditRequest {
                path: "src.rs",
                search: "let a = 1;",
                replacement: "let a = 2;",
            }
        );

        let multi = parse_edit("f\n<<<\nx\ny\n===\n\n>>>\n").unwrap();
        assert_eq!(multi.search, "x\ny");
        assert_eq!(multi.replacement, "");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "src.rs",
            "src.rs\nsearch\n===\nrepl\n>>>",
            "src.rs\n<<<\nsearch\nrepl\n>>>",
            "src.rs\n<<<\n===\nrepl\n>>>",
            "src.rs\n<<<\nsearch\n===\nrepl",
        ] {
            let err = parse_edit(bad).unwrap_err();
            assert_eq!(err.kind, ToolFailureKind::InvalidInput, "input: {:?}", bad);
        }
    }

    #[test]
    fn test_count_occurrences() {
        assert_eq!(count_occurrences("abc", "x", 2), 0);
        assert_eq!(count_occurrences("abc abc abc", "abc", 2), 2);
        assert_eq!(count_occurrences("aaa", "aa", 5), 2);
    }

    #[tokio::test]
    async fn test_single_match_rewrites_once() {
        let (dir, ctx) = setup("fn main() {\n    println!(\"hi\");\n}\n");
        let result = EditFileTool
            .execute("src.rs\n<<<\n    println!(\"hi\");\n===\n    println!(\"bye\");\n>>>", &ctx)
            .await;
        assert!(result.is_ok());
        assert_eq!(read(&dir), "fn main() {\n    println!(\"bye\");\n}\n");
    }

    #[tokio::test]
    async fn test_no_match_leaves_file_untouched() {
        let (dir, ctx) = setup("alpha\nbeta\n");
        let failure = EditFileTool
            .execute("src.rs\n<<<\ngamma\n===\ndelta\n>>>", &ctx)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::NoMatch);
        assert_eq!(read(&dir), "alpha\nbeta\n");
    }

    #[tokio::test]
    async fn test_ambiguous_match_leaves_file_untouched() {
        let (dir, ctx) = setup("x = 1\ny = 2\nx = 1\n");
        let failure = EditFileTool
            .execute("src.rs\n<<<\nx = 1\n===\nx = 3\n>>>", &ctx)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::AmbiguousMatch);
        assert_eq!(read(&dir), "x = 1\ny = 2\nx = 1\n");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());
        let failure = EditFileTool
            .execute("missing.rs\n<<<\na\n===\nb\n>>>", &ctx)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::NotFound);
    }
}
