//! archon-toolserver — standalone tool server over stdio.
//!
//! Exposes the built-in tools (and a demo invoice lookup) over the
//! JSON-RPC tool protocol so the runtime can spawn this binary as a
//! remote tool server. Logs go to stderr; stdout carries the protocol.

use std::path::PathBuf;

use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use archon_mcp::server::McpServer;
use archon_mcp::transport::StdioTransport;
use archon_runtime::tool::{Tool, ToolContext, ToolDefinition, ToolError};
use archon_runtime::tools::{FileReadTool, FileWriteTool, HttpFetchTool, ShellExecuteTool};
use archon_runtime::ToolRegistry;

// ── CLI ─────────────────────────────────────────────────────────────

/// Serve the built-in tools over stdio.
#[derive(Parser, Debug)]
#[command(name = "archon-toolserver", version, about)]
struct Cli {
    /// Working directory for file and shell tools.
    #[arg(long, env = "ARCHON_WORKSPACE_DIR")]
    workspace: Option<PathBuf>,

    /// Server name reported during the handshake.
    #[arg(long, default_value = "archon-toolserver")]
    name: String,

    /// Also register the demo invoice lookup tool.
    #[arg(long, default_value_t = false)]
    with_demo_tools: bool,
}

// ── Demo tool ───────────────────────────────────────────────────────

/// Canned invoice lookup used for end-to-end protocol demos.
struct InvoiceLookupTool;

#[async_trait]
impl Tool for InvoiceLookupTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "invoice_lookup".to_string(),
            description: "Look up an invoice by its identifier.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "invoice_id": {
                        "type": "string",
                        "description": "The invoice identifier, e.g. INV-001"
                    }
                },
                "required": ["invoice_id"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<String, ToolError> {
        let id = input
            .get("invoice_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'invoice_id' field".to_string()))?;

        match id {
            "INV-001" => Ok(serde_json::json!({
                "invoice_id": "INV-001",
                "vendor": "ACME Corp",
                "total": 1250.00,
                "currency": "EUR",
                "status": "pending"
            })
            .to_string()),
            _ => Err(ToolError::ExecutionFailed(format!(
                "no invoice found for '{id}'"
            ))),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is the wire; everything observable goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let mut registry = ToolRegistry::new();
    registry.register(FileReadTool)?;
    registry.register(FileWriteTool)?;
    registry.register(ShellExecuteTool)?;
    registry.register(HttpFetchTool::new())?;
    if cli.with_demo_tools {
        registry.register(InvoiceLookupTool)?;
    }

    info!(
        name = %cli.name,
        workspace = %workspace.display(),
        tools = registry.len(),
        "starting tool server"
    );

    let mut server = McpServer::new(registry)
        .with_name(cli.name)
        .with_working_directory(workspace);
    let mut transport = StdioTransport::new();
    server.run(&mut transport).await?;

    Ok(())
}
