//! The orchestrating core: one conversational turn end to end.
//!
//! Flow: sweep sessions → fetch/create session → compress history if
//! needed → append user turn → render prompt with role context → model
//! call (with retry) → optional tool batch → optional reflection pass →
//! append and return the final text.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use archon_core::RuntimeConfig;

use crate::conversation::{ConversationStore, PromptBlock, Role, FALLBACK_SUMMARY};
use crate::orchestrator::ToolOrchestrator;
use crate::policy::ActiveMode;
use crate::provider::{ModelError, ModelProvider, ModelRequest, ModelTurn};
use crate::session::SessionManager;

const SYSTEM_INSTRUCTION: &str = "\
You are a tool-using assistant runtime.
Rules:
1. Answer in the user's language.
2. Invoke tools through the declared tool-call interface, never by describing them in prose.
3. Never use shell commands to read web pages; use the fetch tool.
4. Never invent data, names, numbers or links. If the information is not in \
your context or obtainable through a tool, say you do not have it.";

const SUMMARIZE_INSTRUCTION: &str = "\
Summarize the following conversation transcript in a compact paragraph. \
Preserve facts, decisions, names and open tasks. Output only the summary.";

impl ActiveMode {
    /// Behavioral constraints injected into the system block per turn.
    pub fn role_context(&self) -> &'static str {
        match self {
            Self::Chat => {
                "Conversational mode: act as a friendly, direct assistant. Tools are disabled."
            }
            Self::Dev => {
                "Developer mode: write, analyze and execute code. You are an expert in software and systems architecture."
            }
            Self::Research => {
                "Research mode: find information, read web pages and synthesize complex data into precise answers. Do not modify the system."
            }
            Self::Analyst => {
                "Analyst mode: process documents and analyze data with precision. This mode is read-only; never modify the system."
            }
            Self::Auto => {
                "Autonomous mode: analyze the request and decide freely which tools and tone to use."
            }
        }
    }
}

/// The runtime engine. One instance is constructed by the process entry
/// point and shared (by reference or `Arc`) across transport adapters.
pub struct RuntimeEngine {
    provider: Arc<dyn ModelProvider>,
    sessions: SessionManager,
    orchestrator: ToolOrchestrator,
    temperature: f32,
    max_tokens: u32,
    max_retries: usize,
    retry_backoff: Duration,
}

impl RuntimeEngine {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        orchestrator: ToolOrchestrator,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            provider,
            sessions: SessionManager::new(
                config.session.ttl_secs,
                config.memory.max_history,
                config.memory.keep_recent,
            ),
            orchestrator,
            temperature: config.model.temperature,
            max_tokens: config.model.max_tokens,
            max_retries: config.model.max_retries,
            retry_backoff: Duration::from_secs(config.model.retry_backoff_secs),
        }
    }

    /// Override the first retry delay (tests use milliseconds).
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Process one user turn for `session_id` under `mode` and return the
    /// final reply text.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        user_text: &str,
        mode: ActiveMode,
    ) -> Result<String, EngineError> {
        self.sessions.sweep(chrono::Utc::now()).await;
        let session = self.sessions.get_or_create(session_id).await;
        // Serializes concurrent requests on the same session; other
        // sessions proceed independently.
        let mut store = session.store.lock().await;

        if store.needs_compression() {
            self.compress(&mut store).await;
        }

        store.append(Role::User, user_text);

        let tools = self.orchestrator.tool_definitions().await;
        let blocks = store.render();
        let request = ModelRequest {
            system: Some(format!("{SYSTEM_INSTRUCTION}\n\n{}", mode.role_context())),
            blocks: blocks.clone(),
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(session_id, mode = %mode, blocks = blocks.len(), "generating");
        let turn = self.generate_with_retry(request).await?;

        let final_text = match turn {
            ModelTurn::Text(text) => text,
            ModelTurn::ToolCalls { text, calls } => {
                info!(session_id, count = calls.len(), "model requested tools");
                let outcome = self.orchestrator.execute_turn(&calls, mode).await;

                if !outcome.any_succeeded {
                    // Show the user exactly what was blocked or failed.
                    format!(
                        "No tool operations could be completed.\n\n{}",
                        outcome.render_outputs()
                    )
                } else if let Some(payload) = outcome.side_channel {
                    // Deterministic extraction: skip the second generation
                    // pass entirely and return the captured payload.
                    debug!(session_id, "side channel captured, skipping reflection");
                    serde_json::to_string_pretty(&payload)
                        .unwrap_or_else(|_| payload.to_string())
                } else {
                    self.reflect(blocks, text, &outcome.render_outputs(), mode)
                        .await?
                }
            }
        };

        store.append(Role::Model, &final_text);
        Ok(final_text)
    }

    /// Second generation pass over tool outputs.
    async fn reflect(
        &self,
        mut blocks: Vec<PromptBlock>,
        model_text: Option<String>,
        tool_outputs: &str,
        mode: ActiveMode,
    ) -> Result<String, EngineError> {
        blocks.push(PromptBlock::model(
            model_text.unwrap_or_else(|| "Working with tools.".to_string()),
        ));
        blocks.push(PromptBlock::user(format!(
            "Tool results:\n{tool_outputs}\n\nUsing these results, answer my previous request."
        )));

        let request = ModelRequest {
            system: Some(format!("{SYSTEM_INSTRUCTION}\n\n{}", mode.role_context())),
            blocks,
            // No tools on the reflection pass; this turn is for answering.
            tools: Vec::new(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match self.generate_with_retry(request).await? {
            ModelTurn::Text(text) => Ok(text),
            ModelTurn::ToolCalls { text, .. } => {
                // Tool requests without tool schemas are a provider quirk;
                // fall back to whatever text came along.
                Ok(text.unwrap_or_else(|| tool_outputs.to_string()))
            }
        }
    }

    /// Collapse old history into a regenerated rolling summary. Never
    /// fatal: on any failure the fixed fallback summary is applied so the
    /// session stays usable and bounded.
    async fn compress(&self, store: &mut ConversationStore) {
        let old = store.messages_to_compress();
        if old.is_empty() {
            return;
        }

        let mut transcript = String::new();
        if let Some(previous) = store.rolling_summary() {
            transcript.push_str(&format!("(earlier summary) {previous}\n"));
        }
        for msg in old {
            let tag = match msg.role {
                Role::User => "user",
                Role::Model => "model",
                Role::SystemSummary => "context",
            };
            transcript.push_str(&format!("{tag}: {}\n", msg.content));
        }

        let request = ModelRequest {
            system: Some(SUMMARIZE_INSTRUCTION.to_string()),
            blocks: vec![PromptBlock::user(transcript)],
            tools: Vec::new(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let summary = match self.generate_with_retry(request).await {
            Ok(ModelTurn::Text(text)) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("summarization returned no usable text, applying fallback");
                FALLBACK_SUMMARY.to_string()
            }
            Err(e) => {
                warn!(error = %e, "summarization failed, applying fallback");
                FALLBACK_SUMMARY.to_string()
            }
        };

        info!(dropped = old.len(), "compressing conversation history");
        store.apply_compression(summary);
    }

    /// Call the collaborator, retrying transient failures with exponential
    /// backoff. Non-transient errors propagate immediately.
    async fn generate_with_retry(&self, request: ModelRequest) -> Result<ModelTurn, EngineError> {
        let mut delay = self.retry_backoff;
        for attempt in 1..=self.max_retries {
            match self.provider.generate(request.clone()).await {
                Ok(turn) => return Ok(turn),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!(
                        attempt,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient model error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) if e.is_transient() => {
                    return Err(EngineError::RetriesExhausted {
                        attempts: self.max_retries,
                    });
                }
                Err(e) => return Err(EngineError::Model(e)),
            }
        }
        Err(EngineError::RetriesExhausted {
            attempts: self.max_retries,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),
    #[error("Model call failed after {attempts} attempts")]
    RetriesExhausted { attempts: usize },
}
