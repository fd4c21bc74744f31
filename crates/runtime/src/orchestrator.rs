//! Executes one model turn's batch of tool-invocation requests.
//!
//! Per request: capability policy, then built-in handler lookup, then
//! remote delegation. Failures are contained per call — one bad tool never
//! aborts the batch — and output order always matches request order, even
//! though execution runs concurrently.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::policy::{self, ActiveMode, PolicyDecision};
use crate::registry::ToolRegistry;
use crate::tool::{ToolCallRequest, ToolContext, ToolDefinition};

/// Result of delegating a call to an external tool server.
#[derive(Debug, Clone)]
pub struct RemoteToolOutput {
    pub content: String,
    pub is_error: bool,
}

/// Seam to the remote tool-server client. Defined here, on the consumer
/// side; the protocol crate implements it.
#[async_trait]
pub trait RemoteToolExecutor: Send + Sync {
    /// Definitions of all currently discovered remote tools, refreshing
    /// the cache if it has gone stale.
    async fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Execute a remote tool. Always returns an output — protocol errors,
    /// timeouts, and unknown names become error outputs, not `Err`s.
    async fn execute_remote(&self, name: &str, arguments: &Value) -> RemoteToolOutput;
}

/// How one tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Ok,
    /// Denied by capability policy; never attempted.
    Blocked,
    /// Attempted but failed (execution error, protocol error, unknown tool).
    Failed,
}

/// One tool call's result, attributed back to exactly one request.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub call_id: String,
    pub name: String,
    pub status: OutcomeStatus,
    pub content: String,
}

/// Aggregated result of one turn's batch.
pub struct TurnOutcome {
    /// Same order as the incoming requests.
    pub outcomes: Vec<ToolCallOutcome>,
    /// True iff at least one call neither was blocked nor failed. The sole
    /// signal the engine uses to decide on a reflection pass.
    pub any_succeeded: bool,
    /// Raw arguments of the designated capture tool, mirrored verbatim.
    pub side_channel: Option<Value>,
}

impl TurnOutcome {
    /// Render all outputs as one labelled transcript block.
    pub fn render_outputs(&self) -> String {
        self.outcomes
            .iter()
            .map(|o| format!("--- {} ---\n{}", o.name, o.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Routes a batch of tool calls to built-ins or the remote executor,
/// enforcing capability policy per call.
pub struct ToolOrchestrator {
    registry: Arc<ToolRegistry>,
    remote: Option<Arc<dyn RemoteToolExecutor>>,
    context: ToolContext,
    /// Tool whose raw arguments bypass generation via the side channel.
    capture_tool: Option<String>,
}

impl ToolOrchestrator {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext) -> Self {
        Self {
            registry,
            remote: None,
            context,
            capture_tool: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteToolExecutor>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_capture_tool(mut self, name: impl Into<String>) -> Self {
        self.capture_tool = Some(name.into());
        self
    }

    /// Definitions of every tool callable this turn: built-ins plus
    /// whatever the remote registry currently knows.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.registry.list();
        if let Some(remote) = &self.remote {
            defs.extend(remote.tool_definitions().await);
        }
        defs
    }

    /// Execute a batch of requests under `mode`.
    pub async fn execute_turn(
        &self,
        requests: &[ToolCallRequest],
        mode: ActiveMode,
    ) -> TurnOutcome {
        // Capture happens on name match alone, before policy or execution:
        // the side channel exists precisely to make extraction independent
        // of what else the turn does. Last match wins.
        let side_channel = self.capture_tool.as_deref().and_then(|capture| {
            requests
                .iter()
                .filter(|r| r.name == capture)
                .last()
                .map(|r| r.arguments.clone())
        });

        info!(count = requests.len(), mode = %mode, "executing tool batch");
        let outcomes = join_all(requests.iter().map(|r| self.execute_one(r, mode))).await;

        let any_succeeded = outcomes.iter().any(|o| o.status == OutcomeStatus::Ok);
        TurnOutcome {
            outcomes,
            any_succeeded,
            side_channel,
        }
    }

    async fn execute_one(&self, call: &ToolCallRequest, mode: ActiveMode) -> ToolCallOutcome {
        if let PolicyDecision::Denied { reason } = policy::evaluate(mode, &call.name) {
            warn!(tool = %call.name, mode = %mode, "tool call blocked");
            return ToolCallOutcome {
                call_id: call.id.clone(),
                name: call.name.clone(),
                status: OutcomeStatus::Blocked,
                content: format!("[BLOCKED] '{}' denied: {reason}", call.name),
            };
        }

        // Arguments come from the model as arbitrary JSON; validate the
        // shape here instead of trusting it downstream.
        if !call.arguments.is_object() && !call.arguments.is_null() {
            return self.failed(call, "arguments must be a JSON object".to_string());
        }

        if let Some(tool) = self.registry.get(&call.name) {
            debug!(tool = %call.name, "running built-in tool");
            return match tool.execute(call.arguments.clone(), &self.context).await {
                Ok(output) => ToolCallOutcome {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    status: OutcomeStatus::Ok,
                    content: output,
                },
                Err(e) => self.failed(call, e.to_string()),
            };
        }

        match &self.remote {
            Some(remote) => {
                debug!(tool = %call.name, "delegating to remote tool server");
                let output = remote.execute_remote(&call.name, &call.arguments).await;
                ToolCallOutcome {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    status: if output.is_error {
                        OutcomeStatus::Failed
                    } else {
                        OutcomeStatus::Ok
                    },
                    content: output.content,
                }
            }
            None => self.failed(call, format!("unknown tool '{}'", call.name)),
        }
    }

    fn failed(&self, call: &ToolCallRequest, message: String) -> ToolCallOutcome {
        warn!(tool = %call.name, error = %message, "tool call failed");
        ToolCallOutcome {
            call_id: call.id.clone(),
            name: call.name.clone(),
            status: OutcomeStatus::Failed,
            content: format!("[ERROR {}]: {message}", call.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{EchoTool, Tool, ToolError};

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "always_fails".to_string(),
                description: "Fails unconditionally.".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }
        }

        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed("boom".to_string()))
        }
    }

    struct StubRemote;

    #[async_trait]
    impl RemoteToolExecutor for StubRemote {
        async fn tool_definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "erp_lookup".to_string(),
                description: "remote".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }]
        }

        async fn execute_remote(&self, name: &str, _arguments: &Value) -> RemoteToolOutput {
            if name == "erp_lookup" {
                RemoteToolOutput {
                    content: "remote ok".to_string(),
                    is_error: false,
                }
            } else {
                RemoteToolOutput {
                    content: format!("unknown tool '{name}'"),
                    is_error: true,
                }
            }
        }
    }

    fn orchestrator() -> ToolOrchestrator {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        registry.register(FailingTool).unwrap();
        ToolOrchestrator::new(
            Arc::new(registry),
            ToolContext {
                working_directory: std::path::PathBuf::from("/tmp"),
            },
        )
        .with_remote(Arc::new(StubRemote))
        .with_capture_tool("submit_invoice")
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn test_order_preserved_with_mixed_outcomes() {
        let orch = orchestrator();
        let requests = vec![
            call("1", "always_fails", serde_json::json!({})),
            call("2", "echo", serde_json::json!({"message": "hi"})),
            call("3", "doesNotExist", serde_json::json!({})),
        ];
        let outcome = orch.execute_turn(&requests, ActiveMode::Dev).await;

        assert_eq!(outcome.outcomes.len(), 3);
        assert_eq!(outcome.outcomes[0].call_id, "1");
        assert_eq!(outcome.outcomes[0].status, OutcomeStatus::Failed);
        assert_eq!(outcome.outcomes[1].call_id, "2");
        assert_eq!(outcome.outcomes[1].status, OutcomeStatus::Ok);
        assert_eq!(outcome.outcomes[1].content, "hi");
        assert_eq!(outcome.outcomes[2].call_id, "3");
        assert_eq!(outcome.outcomes[2].status, OutcomeStatus::Failed);
        assert!(outcome.outcomes[2].content.contains("unknown tool"));

        // One failure never hides the successes
        assert!(outcome.any_succeeded);
    }

    #[tokio::test]
    async fn test_chat_mode_blocks_without_execution() {
        let orch = orchestrator();
        let requests = vec![call("1", "echo", serde_json::json!({"message": "hi"}))];
        let outcome = orch.execute_turn(&requests, ActiveMode::Chat).await;

        assert_eq!(outcome.outcomes[0].status, OutcomeStatus::Blocked);
        assert!(outcome.outcomes[0].content.contains("[BLOCKED]"));
        assert!(!outcome.any_succeeded);
    }

    #[tokio::test]
    async fn test_remote_delegation() {
        let orch = orchestrator();
        let requests = vec![call("1", "erp_lookup", serde_json::json!({"q": "inv-7"}))];
        let outcome = orch.execute_turn(&requests, ActiveMode::Dev).await;
        assert_eq!(outcome.outcomes[0].status, OutcomeStatus::Ok);
        assert_eq!(outcome.outcomes[0].content, "remote ok");
    }

    #[tokio::test]
    async fn test_capture_tool_mirrors_arguments() {
        let orch = orchestrator();
        let args = serde_json::json!({"invoice": {"total": 120.5, "vendor": "ACME"}});
        let requests = vec![call("1", "submit_invoice", args.clone())];
        let outcome = orch.execute_turn(&requests, ActiveMode::Auto).await;

        assert_eq!(outcome.side_channel, Some(args));
    }

    #[tokio::test]
    async fn test_capture_applies_even_when_blocked() {
        let orch = orchestrator();
        let args = serde_json::json!({"invoice": {}});
        let requests = vec![call("1", "submit_invoice", args.clone())];
        let outcome = orch.execute_turn(&requests, ActiveMode::Chat).await;

        assert_eq!(outcome.side_channel, Some(args));
        assert!(!outcome.any_succeeded);
    }

    #[tokio::test]
    async fn test_non_object_arguments_rejected() {
        let orch = orchestrator();
        let requests = vec![call("1", "echo", serde_json::json!("just a string"))];
        let outcome = orch.execute_turn(&requests, ActiveMode::Dev).await;
        assert_eq!(outcome.outcomes[0].status, OutcomeStatus::Failed);
        assert!(outcome.outcomes[0].content.contains("JSON object"));
    }

    #[tokio::test]
    async fn test_no_remote_registered() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let orch = ToolOrchestrator::new(
            Arc::new(registry),
            ToolContext {
                working_directory: std::path::PathBuf::from("/tmp"),
            },
        );
        let requests = vec![call("1", "doesNotExist", serde_json::json!({}))];
        let outcome = orch.execute_turn(&requests, ActiveMode::Dev).await;
        assert_eq!(outcome.outcomes[0].status, OutcomeStatus::Failed);
        assert!(outcome.outcomes[0].content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_render_outputs_labels_each_result() {
        let orch = orchestrator();
        let requests = vec![
            call("1", "echo", serde_json::json!({"message": "one"})),
            call("2", "echo", serde_json::json!({"message": "two"})),
        ];
        let outcome = orch.execute_turn(&requests, ActiveMode::Dev).await;
        let rendered = outcome.render_outputs();
        assert!(rendered.contains("--- echo ---"));
        assert!(rendered.contains("one"));
        assert!(rendered.contains("two"));
    }
}
