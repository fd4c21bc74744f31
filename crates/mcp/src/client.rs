//! Client side of the tool-server protocol.
//!
//! `ToolServerPool` manages connections to any number of tool servers,
//! keeps a merged registry of their discovered tools, and implements the
//! runtime's `RemoteToolExecutor` seam. Protocol failures never cross that
//! seam as `Err`: timeouts, unknown names, and malformed responses all
//! become error outputs the model can read.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use archon_runtime::{RemoteToolExecutor, RemoteToolOutput, ToolDefinition};

use crate::error::McpError;
use crate::transport::{McpTransport, ProcessTransport};
use crate::types::*;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(300);

/// Lifecycle of a single server connection. There is no automatic
/// reconnection: once a transport reports EOF or an I/O error the
/// connection stays `Disconnected` until replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One live connection to a tool server over some transport.
pub struct ServerConnection {
    name: String,
    state: ConnectionState,
    transport: Box<dyn McpTransport>,
    next_id: i64,
}

impl ServerConnection {
    pub fn new(name: impl Into<String>, transport: Box<dyn McpTransport>) -> Self {
        Self {
            name: name.into(),
            state: ConnectionState::Disconnected,
            transport,
            next_id: 1,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Perform the initialization handshake.
    pub async fn handshake(&mut self) -> Result<(), McpError> {
        self.state = ConnectionState::Connecting;

        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "archon",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let resp = self.request("initialize", Some(params)).await?;
        if let Some(err) = resp.error {
            self.state = ConnectionState::Disconnected;
            return Err(McpError::ServerUnavailable(err.message));
        }

        self.notify("notifications/initialized", None).await?;
        self.state = ConnectionState::Connected;
        info!(server = %self.name, "tool server connected");
        Ok(())
    }

    /// Send a request and wait for the matching response.
    ///
    /// Responses whose id does not match are skipped: they are the late
    /// answers to calls a caller abandoned on timeout.
    async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        if self.transport.has_exited() {
            self.state = ConnectionState::Disconnected;
            return Err(McpError::ServerUnavailable(format!(
                "'{}' process has exited",
                self.name
            )));
        }

        let id = self.next_id;
        self.next_id += 1;
        let expected = RpcId::Number(id);

        let request = JsonRpcRequest::new(expected.clone(), method, params);
        let json = serde_json::to_string(&request)?;

        debug!(server = %self.name, method = method, id = id, "sending request");

        if let Err(e) = self.transport.send(&json).await {
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }

        loop {
            let line = match self.transport.receive().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(McpError::ServerUnavailable(format!(
                        "'{}' closed the connection",
                        self.name
                    )));
                }
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(e);
                }
            };

            let response: JsonRpcResponse = serde_json::from_str(&line)?;
            if response.id == expected {
                return Ok(response);
            }
            debug!(
                server = %self.name,
                got = ?response.id,
                expected = ?expected,
                "skipping stale response"
            );
        }
    }

    /// Send a notification (no response expected).
    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notif = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&notif)?;
        self.transport.send(&json).await
    }

    /// Ask the server for its tool list.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolInfo>, McpError> {
        let resp = self.request("tools/list", None).await?;
        if let Some(err) = resp.error {
            return Err(McpError::ServerUnavailable(err.message));
        }

        let result: ListToolsResult = serde_json::from_value(
            resp.result
                .ok_or_else(|| McpError::MalformedResult("missing result".to_string()))?,
        )?;
        Ok(result.tools)
    }

    /// Invoke a tool on this server.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: &Value,
    ) -> Result<CallToolResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let resp = self.request("tools/call", Some(params)).await?;
        if let Some(err) = resp.error {
            return Err(McpError::ToolExecution(err.message));
        }

        let result: CallToolResult = serde_json::from_value(
            resp.result
                .ok_or_else(|| McpError::MalformedResult("missing result".to_string()))?,
        )
        .map_err(|e| McpError::MalformedResult(e.to_string()))?;
        Ok(result)
    }
}

/// A discovered remote tool as the pool exposes it.
#[derive(Clone)]
struct RemoteToolEntry {
    /// Server that owns the tool.
    server: String,
    /// Name on the server side; differs from the registry key when a
    /// collision forced qualification.
    remote_name: String,
    info: ToolInfo,
}

/// Connection manager and merged tool registry over all tool servers.
pub struct ToolServerPool {
    connections: RwLock<HashMap<String, Arc<Mutex<ServerConnection>>>>,
    registry: RwLock<HashMap<String, RemoteToolEntry>>,
    refresh_in_flight: AtomicBool,
    last_refresh: std::sync::Mutex<Option<Instant>>,
    call_timeout: Duration,
    discovery_interval: Duration,
}

impl ToolServerPool {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            registry: RwLock::new(HashMap::new()),
            refresh_in_flight: AtomicBool::new(false),
            last_refresh: std::sync::Mutex::new(None),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    /// Spawn a server subprocess and connect to it.
    ///
    /// A failure here leaves the pool without that server but is never
    /// fatal to the caller's startup sequence.
    pub async fn connect(
        &self,
        name: &str,
        program: &str,
        args: &[&str],
    ) -> Result<(), McpError> {
        let transport = ProcessTransport::spawn(program, args)?;
        self.connect_with_transport(name, Box::new(transport)).await
    }

    /// Connect over an already-built transport (used by tests to wire an
    /// in-memory peer).
    pub async fn connect_with_transport(
        &self,
        name: &str,
        transport: Box<dyn McpTransport>,
    ) -> Result<(), McpError> {
        let mut connection = ServerConnection::new(name, transport);
        if let Err(e) = connection.handshake().await {
            warn!(server = name, error = %e, "tool server handshake failed");
            return Err(e);
        }

        self.connections
            .write()
            .await
            .insert(name.to_string(), Arc::new(Mutex::new(connection)));
        Ok(())
    }

    /// Number of registered connections.
    pub async fn server_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Re-run discovery on every connected server and rebuild the merged
    /// registry. At most one refresh runs at a time; a request arriving
    /// mid-refresh uses the existing cache.
    pub async fn refresh_tools(&self) {
        if self.refresh_in_flight.swap(true, Ordering::SeqCst) {
            debug!("discovery already in flight, using cached registry");
            return;
        }

        // Sorted server order makes collision resolution deterministic.
        let mut servers: Vec<(String, Arc<Mutex<ServerConnection>>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(v)))
                .collect()
        };
        servers.sort_by(|a, b| a.0.cmp(&b.0));

        let mut merged: HashMap<String, RemoteToolEntry> = HashMap::new();
        for (server_name, connection) in servers {
            let mut conn = connection.lock().await;
            if conn.state() != ConnectionState::Connected {
                continue;
            }
            let tools = match conn.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(server = %server_name, error = %e, "tool discovery failed");
                    continue;
                }
            };
            drop(conn);

            for info in tools {
                let remote_name = info.name.clone();
                let key = match merged.get(&remote_name) {
                    Some(existing) if existing.server != server_name => {
                        let qualified = format!("{server_name}__{remote_name}");
                        warn!(
                            tool = %remote_name,
                            first = %existing.server,
                            second = %server_name,
                            qualified = %qualified,
                            "tool name collision, registering under qualified name"
                        );
                        qualified
                    }
                    _ => remote_name.clone(),
                };
                merged.insert(
                    key,
                    RemoteToolEntry {
                        server: server_name.clone(),
                        remote_name,
                        info,
                    },
                );
            }
        }

        let count = merged.len();
        *self.registry.write().await = merged;
        *self.last_refresh.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.refresh_in_flight.store(false, Ordering::SeqCst);
        info!(tools = count, "remote tool registry rebuilt");
    }

    /// Refresh the registry if it has gone stale.
    pub async fn ensure_fresh(&self) {
        let stale = {
            let last = self.last_refresh.lock().unwrap_or_else(|e| e.into_inner());
            match *last {
                None => true,
                Some(at) => at.elapsed() >= self.discovery_interval,
            }
        };
        if stale {
            self.refresh_tools().await;
        }
    }

    /// Execute a remote tool by its registry name.
    pub async fn execute(&self, name: &str, arguments: &Value) -> RemoteToolOutput {
        let entry = match self.registry.read().await.get(name) {
            Some(entry) => entry.clone(),
            None => {
                return RemoteToolOutput {
                    content: format!("unknown tool '{name}'"),
                    is_error: true,
                };
            }
        };

        let connection = match self.connections.read().await.get(&entry.server) {
            Some(c) => Arc::clone(c),
            None => {
                return RemoteToolOutput {
                    content: format!("server '{}' is not connected", entry.server),
                    is_error: true,
                };
            }
        };

        let mut conn = connection.lock().await;
        let call = conn.call_tool(&entry.remote_name, arguments);
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(result)) => {
                let text = result
                    .content
                    .into_iter()
                    .map(|c| match c {
                        ToolContent::Text { text } => text,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                RemoteToolOutput {
                    content: text,
                    is_error: result.is_error,
                }
            }
            Ok(Err(e)) => RemoteToolOutput {
                content: format!("tool '{name}' failed: {e}"),
                is_error: true,
            },
            Err(_) => {
                // The abandoned response, if it ever arrives, is skipped
                // by id matching on the next call. The connection stays
                // registered.
                warn!(
                    tool = name,
                    server = %entry.server,
                    timeout_secs = self.call_timeout.as_secs(),
                    "remote tool call timed out"
                );
                RemoteToolOutput {
                    content: format!(
                        "tool '{name}' timed out after {}s",
                        self.call_timeout.as_secs()
                    ),
                    is_error: true,
                }
            }
        }
    }
}

impl Default for ToolServerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteToolExecutor for ToolServerPool {
    async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.ensure_fresh().await;
        self.registry
            .read()
            .await
            .iter()
            .map(|(key, entry)| ToolDefinition {
                name: key.clone(),
                description: entry.info.description.clone(),
                input_schema: flatten_schema(&entry.info.input_schema),
            })
            .collect()
    }

    async fn execute_remote(&self, name: &str, arguments: &Value) -> RemoteToolOutput {
        self.execute(name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::McpServer;
    use crate::transport::ChannelTransport;
    use archon_runtime::tool::EchoTool;
    use archon_runtime::ToolRegistry;

    /// Run an `McpServer` with an echo tool over one end of a channel
    /// pair, returning the client end.
    fn spawn_echo_server() -> ChannelTransport {
        let (client_side, mut server_side) = ChannelTransport::pair();
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let mut server = McpServer::new(registry);
        tokio::spawn(async move { server.run(&mut server_side).await });
        client_side
    }

    #[tokio::test]
    async fn test_connect_and_discover() {
        let pool = ToolServerPool::new();
        pool.connect_with_transport("alpha", Box::new(spawn_echo_server()))
            .await
            .unwrap();
        pool.refresh_tools().await;

        let defs = pool.tool_definitions().await;
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn test_execute_remote_tool() {
        let pool = ToolServerPool::new();
        pool.connect_with_transport("alpha", Box::new(spawn_echo_server()))
            .await
            .unwrap();
        pool.refresh_tools().await;

        let output = pool
            .execute("echo", &serde_json::json!({"message": "over the wire"}))
            .await;
        assert!(!output.is_error);
        assert_eq!(output.content, "over the wire");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_output() {
        let pool = ToolServerPool::new();
        let output = pool.execute("nope", &serde_json::json!({})).await;
        assert!(output.is_error);
        assert!(output.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_collision_registers_qualified_name() {
        let pool = ToolServerPool::new();
        pool.connect_with_transport("alpha", Box::new(spawn_echo_server()))
            .await
            .unwrap();
        pool.connect_with_transport("beta", Box::new(spawn_echo_server()))
            .await
            .unwrap();
        pool.refresh_tools().await;

        let mut names: Vec<String> = pool
            .tool_definitions()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["beta__echo".to_string(), "echo".to_string()]);

        // Qualified name still routes to the right server-side tool
        let output = pool
            .execute("beta__echo", &serde_json::json!({"message": "hi"}))
            .await;
        assert!(!output.is_error);
        assert_eq!(output.content, "hi");
    }

    /// Transport whose peer process is already gone.
    struct ExitedTransport;

    #[async_trait]
    impl McpTransport for ExitedTransport {
        async fn receive(&mut self) -> Result<Option<String>, McpError> {
            Ok(None)
        }

        async fn send(&mut self, _message: &str) -> Result<(), McpError> {
            Ok(())
        }

        fn has_exited(&mut self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_exited_process_fails_fast_and_disconnects() {
        let mut conn = ServerConnection::new("dead", Box::new(ExitedTransport));
        let err = conn.handshake().await.unwrap_err();
        assert!(matches!(err, McpError::ServerUnavailable(_)));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_handshake_failure_leaves_pool_empty() {
        let (client_side, server_side) = ChannelTransport::pair();
        drop(server_side); // peer never answers

        let pool = ToolServerPool::new();
        let result = pool
            .connect_with_transport("dead", Box::new(client_side))
            .await;
        assert!(result.is_err());
        assert_eq!(pool.server_count().await, 0);
    }
}
