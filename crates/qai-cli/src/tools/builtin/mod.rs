//! Built-in tools for the agent loop

mod file_edit;
mod file_read;
mod file_write;
mod git;
mod grep;
mod shell;
mod web_search;

pub use file_edit::EditFileTool;
pub use file_read::ReadFileTool;
pub use file_write::WriteFileTool;
pub use git::{GitCommand, GitTool};
pub use grep::GrepSearchTool;
pub use shell::ShellTool;
pub use web_search::WebSearchTool;
