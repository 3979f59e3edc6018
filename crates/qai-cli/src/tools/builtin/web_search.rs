//! web_search tool using the DuckDuckGo instant-answer API

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::tools::{SecurityLevel, Tool, ToolContext, ToolFailure, ToolFailureKind, ToolResult};

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// Related topics included when there is no direct answer
const MAX_TOPICS: usize = 5;

/// Tool for quick web lookups
pub struct WebSearchTool {
    endpoint: String,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Point the tool at another instant-answer compatible endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

/// Pull a short text summary out of an instant-answer response
fn summarize(response: &Value) -> Option<String> {
    for field in ["AbstractText", "Answer", "Definition"] {
        if let Some(text) = response.get(field).and_then(Value::as_str) {
            let text = text.trim();
            if !text.is_empty() {
                let mut summary = text.to_string();
                if let Some(url) = response
                    .get("AbstractURL")
                    .and_then(Value::as_str)
                    .filter(|u| !u.is_empty())
                {
                    summary.push_str(&format!("\nSource: {}", url));
                }
                return Some(summary);
            }
        }
    }

    let topics: Vec<String> = response
        .get("RelatedTopics")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(|t| t.get("Text").and_then(Value::as_str))
                .filter(|t| !t.trim().is_empty())
                .take(MAX_TOPICS)
                .map(|t| format!("- {}", t.trim()))
                .collect()
        })
        .unwrap_or_default();

    if topics.is_empty() {
        None
    } else {
        Some(format!("Related topics:\n{}", topics.join("\n")))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Look up a query with an instant-answer web service and return a short text summary."
    }

    fn input_format(&self) -> &str {
        "<query>"
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Moderate
    }

    #[instrument(skip(self, input, ctx), fields(query = tracing::field::Empty))]
    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolResult {
        let query = input.trim();
        if query.is_empty() {
            return Err(ToolFailure::invalid_input("expected a search query"));
        }
        tracing::Span::current().record("query", query.chars().take(50).collect::<String>().as_str());

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(ctx.http_timeout)
            .build()
            .map_err(|e| ToolFailure::new(ToolFailureKind::Network, format!("failed to create HTTP client: {}", e)))?;

        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.endpoint,
            urlencoding::encode(query)
        );
        debug!("Sending instant-answer request");

        let response = client.get(&url).send().await.map_err(|e| {
            warn!(error = %e, "Search request failed");
            ToolFailure::new(ToolFailureKind::Network, format!("search request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolFailure::new(
                ToolFailureKind::Network,
                format!("search service returned HTTP {}", status.as_u16()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolFailure::new(ToolFailureKind::Network, format!("unreadable search response: {}", e)))?;

        summarize(&body).ok_or_else(|| {
            ToolFailure::new(ToolFailureKind::EmptyResult, format!("no instant answer for '{}'", query))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_json(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[test]
    fn test_summarize_prefers_abstract() {
        let v = json!({
            "AbstractText": "Rust is a systems programming language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "Answer": "ignored"
        });
        let summary = summarize(&v).unwrap();
        assert!(summary.starts_with("Rust is a systems"));
        assert!(summary.contains("Source: https://en.wikipedia.org"));
    }

    #[test]
    fn test_summarize_falls_back_to_topics() {
        let v = json!({
            "AbstractText": "",
            "Answer": "",
            "RelatedTopics": [
                {"Text": "Tokio - an async runtime"},
                {"Name": "group without text", "Topics": []},
                {"Text": "Serde - serialization"}
            ]
        });
        assert_eq!(
            summarize(&v).unwrap(),
            "Related topics:\n- Tokio - an async runtime\n- Serde - serialization"
        );
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize(&json!({"AbstractText": "", "RelatedTopics": []})), None);
    }

    #[tokio::test]
    async fn test_search_against_local_endpoint() {
        let endpoint = serve_json(r#"{"AbstractText":"","Answer":"42"}"#).await;
        let tool = WebSearchTool::with_endpoint(endpoint);
        let result = tool.execute("meaning of life", &ToolContext::default()).await;
        assert_eq!(result, Ok("42".to_string()));
    }

    #[tokio::test]
    async fn test_empty_result() {
        let endpoint = serve_json(r#"{"AbstractText":"","Answer":"","RelatedTopics":[]}"#).await;
        let tool = WebSearchTool::with_endpoint(endpoint);
        let failure = tool.execute("zzzz", &ToolContext::default()).await.unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::EmptyResult);
    }

    #[tokio::test]
    async fn test_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let tool = WebSearchTool::with_endpoint(format!("http://{}/", addr));
        let failure = tool.execute("rust", &ToolContext::default()).await.unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::Network);
    }
}
