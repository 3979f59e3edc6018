//! Tool routing and dispatch

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::registry::ToolRegistry;
use super::{ToolContext, ToolFailure, ToolFailureKind, ToolResult};

/// Time a tool gets to wind down on its own after a cancel
const CANCEL_GRACE: Duration = Duration::from_millis(250);

/// Router for dispatching tool calls
pub struct ToolRouter {
    registry: ToolRegistry,
}

impl ToolRouter {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Route a single tool call.
    ///
    /// Unknown tools and cancellation come back as failures like any other
    /// tool error; output is truncated to the context's limit.
    #[instrument(skip(self, input, ctx), fields(tool = %name))]
    pub async fn route(&self, name: &str, input: &str, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.registry.get(name) else {
            warn!(tool = %name, "Tool not found");
            return Err(ToolFailure::new(
                ToolFailureKind::UnknownTool,
                format!(
                    "no tool named '{}'; available tools: {}",
                    name,
                    self.registry.list_names().join(", ")
                ),
            ));
        };

        debug!(security_level = %tool.security_level(), input_len = input.len(), "Executing tool");

        // Tools that watch the token (shell) clean up their processes first
        let cancelled = async {
            ctx.cancel.cancelled().await;
            tokio::time::sleep(CANCEL_GRACE).await;
        };
        let result = tokio::select! {
            biased;
            result = tool.execute(input, ctx) => result,
            _ = cancelled => Err(ToolFailure::new(ToolFailureKind::Cancelled, "cancelled by user")),
        };

        match result {
            Ok(output) => {
                info!(tool = %name, output_len = output.len(), "Tool executed successfully");
                Ok(ctx.truncate(output))
            }
            Err(failure) => {
                warn!(tool = %name, kind = %failure.kind, "Tool execution failed");
                Err(ToolFailure {
                    detail: ctx.truncate(failure.detail),
                    ..failure
                })
            }
        }
    }

    /// Get a reference to the registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{SecurityLevel, Tool};
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes input"
        }

        fn input_format(&self) -> &str {
            "text"
        }

        fn security_level(&self) -> SecurityLevel {
            SecurityLevel::Safe
        }

        async fn execute(&self, input: &str, _ctx: &ToolContext) -> ToolResult {
            Ok(input.to_string())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes"
        }

        fn input_format(&self) -> &str {
            ""
        }

        fn security_level(&self) -> SecurityLevel {
            SecurityLevel::Safe
        }

        async fn execute(&self, _input: &str, _ctx: &ToolContext) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn router() -> ToolRouter {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(SlowTool);
        ToolRouter::new(registry)
    }

    #[tokio::test]
    async fn test_router_execute() {
        let result = router().route("echo", "hello", &ToolContext::default()).await;
        assert_eq!(result, Ok("hello".to_string()));
    }

    #[tokio::test]
    async fn test_router_not_found() {
        let failure = router()
            .route("nonexistent", "", &ToolContext::default())
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ToolFailureKind::UnknownTool);
        assert!(failure.detail.contains("echo"));
    }

    #[tokio::test]
    async fn test_router_truncates_output() {
        let ctx = ToolContext::default().with_max_output_len(4);
        let output = router().route("echo", "abcdefgh", &ctx).await.unwrap();
        assert!(output.starts_with("abcd\n"));
    }

    #[tokio::test]
    async fn test_router_cancel() {
        let ctx = ToolContext::default();
        let cancel = ctx.cancel.clone();
        let router = router();
        let handle = tokio::spawn(async move { router.route("slow", "", &ctx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err().kind, ToolFailureKind::Cancelled);
    }
}
