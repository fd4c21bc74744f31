//! Session-aware, tool-using agent runtime.
//!
//! Turns a stateless text-generation collaborator into a stateful agent:
//! per-session conversation memory with rolling summarization, capability
//! gating by active mode, and dispatch of model-requested tool calls to
//! built-in handlers or externally registered tool servers.
//!
//! The entry point constructs everything explicitly and passes the engine
//! by handle — there is no global state:
//!
//! ```no_run
//! use std::sync::Arc;
//! use archon_core::RuntimeConfig;
//! use archon_runtime::{ActiveMode, RuntimeEngine, ToolOrchestrator, ToolRegistry};
//! use archon_runtime::tools::{FileReadTool, ShellExecuteTool};
//! use archon_runtime::tool::ToolContext;
//!
//! # async fn example(provider: Arc<dyn archon_runtime::ModelProvider>) -> anyhow::Result<()> {
//! let config = RuntimeConfig::from_env();
//! let mut registry = ToolRegistry::new();
//! registry.register(FileReadTool)?;
//! registry.register(ShellExecuteTool)?;
//!
//! let context = ToolContext { working_directory: config.tools.workspace_dir.clone() };
//! let orchestrator = ToolOrchestrator::new(Arc::new(registry), context)
//!     .with_capture_tool("submit_invoice");
//! let engine = RuntimeEngine::new(provider, orchestrator, &config);
//!
//! let reply = engine.handle_turn("session-1", "hello", ActiveMode::Chat).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod conversation;
pub mod engine;
pub mod orchestrator;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod session;
pub mod tool;
pub mod tools;

pub use conversation::{ConversationStore, Message, PromptBlock, PromptRole, Role};
pub use engine::{EngineError, RuntimeEngine};
pub use orchestrator::{
    OutcomeStatus, RemoteToolExecutor, RemoteToolOutput, ToolCallOutcome, ToolOrchestrator,
    TurnOutcome,
};
pub use policy::{ActiveMode, PolicyDecision};
pub use provider::{ModelError, ModelProvider, ModelRequest, ModelTurn};
pub use registry::ToolRegistry;
pub use session::{SessionHandle, SessionManager};
pub use tool::{Tool, ToolCallRequest, ToolContext, ToolDefinition, ToolError};
