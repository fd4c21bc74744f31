//! Gemini adapter for the runtime's `ModelProvider` seam.
//!
//! Speaks the `generateContent` API with function calling: tool schemas go
//! out as `functionDeclarations`, and `functionCall` parts in the response
//! come back as structured tool requests. The API does not assign call
//! ids, so the adapter synthesizes them per response.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use archon_runtime::{
    ModelError, ModelProvider, ModelRequest, ModelTurn, PromptRole, ToolCallRequest,
};

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    /// Build the generateContent request body.
    fn build_request_body(request: &ModelRequest) -> Value {
        let contents: Vec<Value> = request
            .blocks
            .iter()
            .map(|b| {
                json!({
                    "role": match b.role {
                        PromptRole::User => "user",
                        PromptRole::Model => "model",
                    },
                    "parts": [{ "text": b.content }],
                })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
        });

        if let Some(system) = &request.system {
            body["system_instruction"] = json!({
                "parts": [{ "text": system }],
            });
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        body
    }

    /// Split response parts into leading text and function calls.
    fn parse_response(resp: &Value) -> Result<ModelTurn, ModelError> {
        let parts = resp["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                ModelError::InvalidResponse("missing candidates[0].content.parts".to_string())
            })?;

        let mut text_parts: Vec<&str> = Vec::new();
        let mut calls: Vec<ToolCallRequest> = Vec::new();

        for part in parts {
            if let Some(text) = part["text"].as_str() {
                text_parts.push(text);
            }
            if let Some(call) = part.get("functionCall") {
                let name = call["name"].as_str().ok_or_else(|| {
                    ModelError::InvalidResponse("functionCall without a name".to_string())
                })?;
                calls.push(ToolCallRequest {
                    id: format!("call_{}", calls.len()),
                    name: name.to_string(),
                    arguments: call.get("args").cloned().unwrap_or(Value::Null),
                });
            }
        }

        let text = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join(""))
        };

        if calls.is_empty() {
            Ok(ModelTurn::Text(text.unwrap_or_default()))
        } else {
            Ok(ModelTurn::ToolCalls { text, calls })
        }
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn generate(&self, request: ModelRequest) -> Result<ModelTurn, ModelError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key,
        );

        let body = Self::build_request_body(&request);
        debug!(model = %self.model, blocks = request.blocks.len(), "gemini request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            429 => return Err(ModelError::RateLimited),
            500 | 502 | 503 => {
                let body = response.text().await.unwrap_or_default();
                return Err(ModelError::Unavailable(body));
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                return Err(ModelError::Api {
                    status,
                    message: body,
                });
            }
        }

        let resp: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Self::parse_response(&resp)
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_runtime::{PromptBlock, ToolDefinition};

    fn request_with(tools: Vec<ToolDefinition>) -> ModelRequest {
        ModelRequest {
            system: Some("Be brief.".to_string()),
            blocks: vec![
                PromptBlock::user("Hello"),
                PromptBlock::model("Hi there!"),
                PromptBlock::user("How are you?"),
            ],
            tools,
            temperature: 0.2,
            max_tokens: 4096,
        }
    }

    #[test]
    fn test_request_body_structure() {
        let body = GeminiProvider::build_request_body(&request_with(Vec::new()));

        assert_eq!(
            body["system_instruction"]["parts"][0]["text"]
                .as_str()
                .unwrap(),
            "Be brief.",
        );

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "How are you?");

        // No tools key when no tools were offered
        assert!(body.get("tools").is_none());
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn test_request_body_with_tool_declarations() {
        let tools = vec![ToolDefinition {
            name: "file_read".to_string(),
            description: "Read a file".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        }];
        let body = GeminiProvider::build_request_body(&request_with(tools));

        let decls = body["tools"][0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0]["name"], "file_read");
        assert_eq!(decls[0]["parameters"]["type"], "object");
    }

    #[test]
    fn test_parse_text_response() {
        let resp = json!({
            "candidates": [{
                "content": {"parts": [{"text": "All good."}]}
            }]
        });
        let turn = GeminiProvider::parse_response(&resp).unwrap();
        match turn {
            ModelTurn::Text(text) => assert_eq!(text, "All good."),
            _ => panic!("expected text turn"),
        }
    }

    #[test]
    fn test_parse_function_call_response() {
        let resp = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Let me check."},
                    {"functionCall": {"name": "file_read", "args": {"path": "a.txt"}}},
                    {"functionCall": {"name": "shell_execute", "args": {"command": "ls"}}}
                ]}
            }]
        });
        let turn = GeminiProvider::parse_response(&resp).unwrap();
        match turn {
            ModelTurn::ToolCalls { text, calls } => {
                assert_eq!(text.as_deref(), Some("Let me check."));
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].name, "file_read");
                assert_eq!(calls[0].id, "call_0");
                assert_eq!(calls[1].id, "call_1");
                assert_eq!(calls[0].arguments["path"], "a.txt");
            }
            _ => panic!("expected tool calls"),
        }
    }

    #[test]
    fn test_parse_missing_parts_is_invalid() {
        let resp = json!({"candidates": []});
        let err = GeminiProvider::parse_response(&resp).unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }
}
