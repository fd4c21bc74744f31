//! Remote tool-server protocol for the archon runtime.
//!
//! Implements a minimal tool-interoperability protocol over JSON-RPC 2.0
//! with newline-delimited framing, so external tool servers can be spawned
//! as subprocesses and their tools exposed to the engine alongside the
//! built-ins.
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and protocol-specific wire types, plus schema
//!   flattening for model consumption
//! - **transport**: pluggable framing layer (stdio, child process, channels)
//! - **client**: `ToolServerPool`, the engine-facing connection manager and
//!   `RemoteToolExecutor` implementation
//! - **server**: minimal server loop wrapping a `ToolRegistry`
//! - **error**: unified error types
//!
//! # Usage
//!
//! ## Client side (the runtime)
//! ```no_run
//! use archon_mcp::client::ToolServerPool;
//!
//! # async fn example() {
//! let pool = ToolServerPool::new();
//! if let Err(e) = pool.connect("invoices", "node", &["server.js"]).await {
//!     tracing::warn!(error = %e, "tool server unavailable, continuing without it");
//! }
//! pool.refresh_tools().await;
//! # }
//! ```
//!
//! ## Server side
//! ```no_run
//! use archon_mcp::server::McpServer;
//! use archon_mcp::transport::StdioTransport;
//! use archon_runtime::ToolRegistry;
//!
//! # async fn example() {
//! let registry = ToolRegistry::new();
//! let mut server = McpServer::new(registry);
//! let mut transport = StdioTransport::new();
//! server.run(&mut transport).await.unwrap();
//! # }
//! ```

pub mod client;
pub mod error;
pub mod server;
pub mod transport;
pub mod types;

pub use client::{ConnectionState, ServerConnection, ToolServerPool};
pub use error::McpError;
pub use server::McpServer;
pub use transport::{ChannelTransport, McpTransport, ProcessTransport, StdioTransport};
pub use types::*;
