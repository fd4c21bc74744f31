use crate::conversation::PromptBlock;
use crate::tool::{ToolCallRequest, ToolDefinition};
use async_trait::async_trait;

/// A fully assembled model request: ordered role-tagged blocks, a system
/// instruction, the tool schemas available this turn, and sampling
/// parameters (kept low for deterministic-leaning behavior).
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub blocks: Vec<PromptBlock>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Structured outcome of one generation call.
///
/// A discriminated type, so callers never string-match response text to
/// tell "plain answer" apart from "wants tools".
#[derive(Debug, Clone)]
pub enum ModelTurn {
    /// Free text — the model answered directly.
    Text(String),
    /// The model requested tool invocations (optionally with leading text).
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

/// Trait for the generative-model collaborator.
///
/// Defined here, on the consumer side: the engine dictates the contract,
/// concrete API adapters implement it elsewhere. Retry for transient
/// failures is owned by the engine, not by implementations.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelTurn, ModelError>;

    /// Provider name for logging/debugging.
    fn provider_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Rate limited")]
    RateLimited,
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ModelError {
    /// Transient errors are retried by the engine; everything else
    /// propagates immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable(_))
    }
}

/// Mock model provider for testing the engine without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Returns pre-queued turns in FIFO order and records every request it
    /// receives, so tests can assert on rendered prompt content.
    pub struct MockModelProvider {
        turns: Mutex<std::collections::VecDeque<Result<ModelTurn, ModelError>>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl MockModelProvider {
        pub fn new() -> Self {
            Self {
                turns: Mutex::new(std::collections::VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn queue_turn(&self, turn: ModelTurn) {
            self.turns.lock().unwrap().push_back(Ok(turn));
        }

        pub fn queue_text(&self, text: &str) {
            self.queue_turn(ModelTurn::Text(text.to_string()));
        }

        pub fn queue_error(&self, err: ModelError) {
            self.turns.lock().unwrap().push_back(Err(err));
        }

        pub fn queue_tool_calls(&self, calls: Vec<ToolCallRequest>) {
            self.queue_turn(ModelTurn::ToolCalls { text: None, calls });
        }

        /// Requests seen so far, oldest first.
        pub fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Default for MockModelProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ModelProvider for MockModelProvider {
        async fn generate(&self, request: ModelRequest) -> Result<ModelTurn, ModelError> {
            self.requests.lock().unwrap().push(request);
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ModelTurn::Text(String::new())))
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }
}
