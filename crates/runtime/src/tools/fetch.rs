//! HTTP fetch tool backed by `reqwest`.
//!
//! GET-only; response bodies are capped so a large page cannot flood
//! the prompt.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError};

const BODY_CHAR_CAP: usize = 8000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fetch the body of a URL via HTTP GET.
pub struct HttpFetchTool {
    client: reqwest::Client,
}

impl HttpFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: super::HTTP_FETCH.to_string(),
            description: "Fetch a URL via HTTP GET and return the response body (truncated)."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The http(s) URL to fetch"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<String, ToolError> {
        let url = input
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'url' field".to_string()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidInput(format!(
                "unsupported URL scheme in '{url}'"
            )));
        }

        debug!(url = url, "fetching url");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("request to '{url}' failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "'{url}' returned HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read body: {e}")))?;

        if body.chars().count() > BODY_CHAR_CAP {
            let truncated: String = body.chars().take(BODY_CHAR_CAP).collect();
            Ok(format!("{truncated}\n[truncated at {BODY_CHAR_CAP} characters]"))
        } else {
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_context() -> ToolContext {
        ToolContext {
            working_directory: PathBuf::from("/tmp"),
        }
    }

    #[tokio::test]
    async fn test_missing_url_field() {
        let tool = HttpFetchTool::new();
        let err = tool
            .execute(serde_json::json!({}), &test_context())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let tool = HttpFetchTool::new();
        let err = tool
            .execute(
                serde_json::json!({"url": "file:///etc/passwd"}),
                &test_context(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_definition() {
        let tool = HttpFetchTool::new();
        let def = tool.definition();
        assert_eq!(def.name, "http_fetch");
    }
}
