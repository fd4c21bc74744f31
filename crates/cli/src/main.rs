//! archon — interactive agent runtime over stdin.
//!
//! Wires the whole stack together explicitly: config from the
//! environment, built-in tool registry, external tool servers, the
//! Gemini model adapter, and the runtime engine. Then runs a minimal
//! line-based REPL.

mod gemini;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use archon_core::{config, RuntimeConfig};
use archon_mcp::client::ToolServerPool;
use archon_runtime::tool::ToolContext;
use archon_runtime::tools::{FileReadTool, FileWriteTool, HttpFetchTool, ShellExecuteTool};
use archon_runtime::{ActiveMode, RuntimeEngine, ToolOrchestrator, ToolRegistry};

use gemini::GeminiProvider;

/// Interactive agent runtime.
#[derive(Parser, Debug)]
#[command(name = "archon", version, about)]
struct Cli {
    /// Session id for this REPL instance.
    #[arg(long, default_value = "local")]
    session: String,

    /// Starting mode (CHAT, DEV, RESEARCH, ANALYST, AUTO).
    #[arg(long, default_value = "AUTO")]
    mode: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();
    config.log_summary();

    let mut registry = ToolRegistry::new();
    registry.register(FileReadTool)?;
    registry.register(FileWriteTool)?;
    registry.register(ShellExecuteTool)?;
    registry.register(HttpFetchTool::new())?;

    let pool = Arc::new(
        ToolServerPool::new()
            .with_call_timeout(Duration::from_secs(config.tools.call_timeout_secs))
            .with_discovery_interval(Duration::from_secs(config.tools.discovery_interval_secs)),
    );
    for spec in &config.tools.servers {
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        if let Err(e) = pool.connect(&spec.name, &spec.command, &args).await {
            warn!(server = %spec.name, error = %e, "tool server unavailable, continuing without it");
        }
    }
    pool.refresh_tools().await;

    let context = ToolContext {
        working_directory: config.tools.workspace_dir.clone(),
    };
    let mut orchestrator =
        ToolOrchestrator::new(Arc::new(registry), context).with_remote(Arc::clone(&pool) as _);
    if let Some(capture) = &config.tools.capture_tool {
        orchestrator = orchestrator.with_capture_tool(capture);
    }

    let api_key = config
        .model
        .api_key
        .clone()
        .context("ARCHON_API_KEY is not set")?;
    let provider = Arc::new(GeminiProvider::new(api_key, config.model.name.clone()));

    let engine = RuntimeEngine::new(provider, orchestrator, &config);

    let mut mode = ActiveMode::parse(&cli.mode);
    info!(session = %cli.session, mode = %mode, "ready");
    println!("archon ready. /mode <name> switches mode, /quit exits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{mode}> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(tag) = input.strip_prefix("/mode") {
            mode = ActiveMode::parse(tag);
            println!("mode set to {mode}");
            continue;
        }
        if input == "/quit" || input == "/exit" {
            break;
        }

        match engine.handle_turn(&cli.session, input, mode).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}
