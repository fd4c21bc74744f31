//! JSON-RPC 2.0 and protocol wire types.
//!
//! The tool-server protocol speaks JSON-RPC 2.0 with newline-delimited
//! framing. Also home to the schema-flattening helper that reduces server
//! schemas to the primitive subset the model request format accepts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use archon_runtime::ToolDefinition;

// ── JSON-RPC 2.0 Base Types ─────────────────────────────────────────

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC request ID. Can be a number or a string per JSON-RPC 2.0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    String(String),
}

// ── Standard JSON-RPC error codes ───────────────────────────────────

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ── Initialize ──────────────────────────────────────────────────────

/// Parameters for the `initialize` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

/// Client capabilities advertised during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
}

/// Information about the connecting client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Result returned from the `initialize` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

/// Server capabilities advertised during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

/// Tools capability descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// Information about the tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// ── tools/list ──────────────────────────────────────────────────────

/// Parameters for `tools/list`. Currently empty but reserved for pagination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolInfo>,
}

/// Describes a single tool in wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

impl From<ToolDefinition> for ToolInfo {
    fn from(def: ToolDefinition) -> Self {
        Self {
            name: def.name,
            description: def.description,
            input_schema: def.input_schema,
        }
    }
}

impl From<ToolInfo> for ToolDefinition {
    fn from(info: ToolInfo) -> Self {
        Self {
            name: info.name,
            description: info.description,
            input_schema: flatten_schema(&info.input_schema),
        }
    }
}

// ── tools/call ──────────────────────────────────────────────────────

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// Content block within a tool call result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text { text: String },
}

// ── Schema flattening ───────────────────────────────────────────────

/// Reduce a server-supplied JSON Schema to the primitive subset the
/// model request format accepts: `string`, `number`, `boolean`, and
/// `object`/`array` containers thereof.
///
/// Unknown or exotic types (`integer`, `$ref`, `anyOf`, ...) degrade to
/// `string` rather than failing discovery; descriptions and `required`
/// lists are preserved, everything else is dropped.
pub fn flatten_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return serde_json::json!({"type": "string"});
    };

    let ty = obj.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let mut out = serde_json::Map::new();

    match ty {
        "string" | "number" | "boolean" => {
            out.insert("type".to_string(), Value::String(ty.to_string()));
        }
        "integer" => {
            out.insert("type".to_string(), Value::String("number".to_string()));
        }
        "array" => {
            out.insert("type".to_string(), Value::String("array".to_string()));
            let items = obj
                .get("items")
                .map(flatten_schema)
                .unwrap_or_else(|| serde_json::json!({"type": "string"}));
            out.insert("items".to_string(), items);
        }
        "object" => {
            out.insert("type".to_string(), Value::String("object".to_string()));
            if let Some(props) = obj.get("properties").and_then(|p| p.as_object()) {
                let flattened: serde_json::Map<String, Value> = props
                    .iter()
                    .map(|(k, v)| (k.clone(), flatten_schema(v)))
                    .collect();
                out.insert("properties".to_string(), Value::Object(flattened));
            }
            if let Some(required) = obj.get("required") {
                out.insert("required".to_string(), required.clone());
            }
        }
        _ => {
            out.insert("type".to_string(), Value::String("string".to_string()));
        }
    }

    if let Some(desc) = obj.get("description") {
        out.insert("description".to_string(), desc.clone());
    }

    Value::Object(out)
}

// ── Helpers ─────────────────────────────────────────────────────────

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: RpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl JsonRpcResponse {
    /// Create a successful response.
    pub fn success(id: RpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: RpcId, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC 2.0 notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

// ── Protocol version ────────────────────────────────────────────────

/// The protocol version this crate implements.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonrpc_request_roundtrip() {
        let req = JsonRpcRequest::new(
            RpcId::Number(1),
            "initialize",
            Some(serde_json::json!({"protocolVersion": "2024-11-05"})),
        );
        let json = serde_json::to_string(&req).unwrap();
        let parsed: JsonRpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.method, "initialize");
        assert_eq!(parsed.id, RpcId::Number(1));
        assert_eq!(parsed.jsonrpc, "2.0");
    }

    #[test]
    fn test_jsonrpc_response_error_roundtrip() {
        let resp = JsonRpcResponse::error(
            RpcId::Number(2),
            error_codes::METHOD_NOT_FOUND,
            "Method not found",
        );
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: JsonRpcResponse = serde_json::from_str(&json).unwrap();
        assert!(parsed.result.is_none());
        let err = parsed.error.unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_rpc_id_number_and_string() {
        let id = RpcId::Number(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let id = RpcId::String("req-1".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"req-1\"");
    }

    #[test]
    fn test_call_tool_result_is_error_omitted_when_false() {
        let result = CallToolResult {
            content: vec![ToolContent::Text {
                text: "hello".to_string(),
            }],
            is_error: false,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("isError"));
        let parsed: CallToolResult = serde_json::from_str(&json).unwrap();
        assert!(!parsed.is_error);
    }

    #[test]
    fn test_flatten_schema_passes_primitives() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "vendor name"},
                "total": {"type": "number"},
                "paid": {"type": "boolean"}
            },
            "required": ["name"]
        });
        let flat = flatten_schema(&schema);
        assert_eq!(flat["properties"]["name"]["type"], "string");
        assert_eq!(flat["properties"]["name"]["description"], "vendor name");
        assert_eq!(flat["properties"]["total"]["type"], "number");
        assert_eq!(flat["required"], serde_json::json!(["name"]));
    }

    #[test]
    fn test_flatten_schema_degrades_exotic_types() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer"},
                "variant": {"anyOf": [{"type": "string"}, {"type": "number"}]},
                "lines": {"type": "array", "items": {"type": "integer"}}
            }
        });
        let flat = flatten_schema(&schema);
        assert_eq!(flat["properties"]["count"]["type"], "number");
        assert_eq!(flat["properties"]["variant"]["type"], "string");
        assert_eq!(flat["properties"]["lines"]["items"]["type"], "number");
    }

    #[test]
    fn test_flatten_schema_non_object_becomes_string() {
        assert_eq!(
            flatten_schema(&serde_json::json!(true)),
            serde_json::json!({"type": "string"})
        );
    }

    #[test]
    fn test_tool_info_into_definition_flattens() {
        let info = ToolInfo {
            name: "lookup".to_string(),
            description: "Lookup".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"id": {"type": "integer"}}
            }),
        };
        let def: ToolDefinition = info.into();
        assert_eq!(def.name, "lookup");
        assert_eq!(def.input_schema["properties"]["id"]["type"], "number");
    }

    #[test]
    fn test_initialize_result_roundtrip() {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: "archon-toolserver".to_string(),
                version: Some("0.1.0".to_string()),
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        let parsed: InitializeResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.protocol_version, PROTOCOL_VERSION);
        assert_eq!(parsed.server_info.name, "archon-toolserver");
    }
}
