//! Per-session conversation memory with rolling summarization.
//!
//! The store never summarizes on its own: the engine checks
//! `needs_compression()` before building a prompt, obtains a summary from
//! the model collaborator, and calls `apply_compression`. On summarization
//! failure the engine applies [`FALLBACK_SUMMARY`] instead — history must
//! shrink either way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Applied when the summarization call fails; bounding memory matters more
/// than what the summary says.
pub const FALLBACK_SUMMARY: &str = "prior context omitted";

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
    /// Synthesized context (e.g. an injected summary), rendered on the user side.
    SystemSummary,
}

/// A message in the conversation history. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Role tag on a rendered prompt block. The downstream collaborator only
/// understands a strict user/model alternation, so `Role::SystemSummary`
/// never survives rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    User,
    Model,
}

/// One role-tagged block of a rendered model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBlock {
    pub role: PromptRole,
    pub content: String,
}

impl PromptBlock {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Model,
            content: content.into(),
        }
    }
}

/// Ordered message log plus an optional rolling summary of older turns.
pub struct ConversationStore {
    messages: Vec<Message>,
    rolling_summary: Option<String>,
    /// Message count above which compression is requested.
    max_history: usize,
    /// Raw messages retained after compression.
    keep_recent: usize,
}

impl ConversationStore {
    pub fn new(max_history: usize, keep_recent: usize) -> Self {
        Self {
            messages: Vec::new(),
            rolling_summary: None,
            max_history,
            keep_recent,
        }
    }

    /// Append a message. Never fails, O(1) amortized.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn rolling_summary(&self) -> Option<&str> {
        self.rolling_summary.as_deref()
    }

    /// True iff the log has outgrown the history threshold.
    pub fn needs_compression(&self) -> bool {
        self.messages.len() > self.max_history
    }

    /// All but the most recent `keep_recent` messages — the slice a
    /// summarization pass should collapse.
    pub fn messages_to_compress(&self) -> &[Message] {
        if self.messages.len() <= self.keep_recent {
            return &[];
        }
        &self.messages[..self.messages.len() - self.keep_recent]
    }

    /// Drop everything but the most recent `keep_recent` messages and
    /// replace the rolling summary (regenerated, never appended to).
    /// Idempotent: repeating with the same cutoff keeps the same tail.
    pub fn apply_compression(&mut self, summary: impl Into<String>) {
        if self.messages.len() > self.keep_recent {
            self.messages
                .drain(..self.messages.len() - self.keep_recent);
        }
        self.rolling_summary = Some(summary.into());
    }

    /// Render the conversation as role-tagged blocks for a model request.
    ///
    /// When a rolling summary exists it is prepended as a synthetic
    /// user/model pair, keeping the strict alternation the collaborator
    /// requires. Consecutive same-role blocks are merged for the same
    /// reason — this is a deliberate normalization step, not a side effect.
    pub fn render(&self) -> Vec<PromptBlock> {
        let mut blocks = Vec::with_capacity(self.messages.len() + 2);

        if let Some(summary) = self.rolling_summary.as_deref() {
            if !summary.is_empty() {
                blocks.push(PromptBlock::user(format!(
                    "Summary of the conversation so far:\n{summary}"
                )));
                blocks.push(PromptBlock::model("Acknowledged."));
            }
        }

        for msg in &self.messages {
            let role = match msg.role {
                Role::User | Role::SystemSummary => PromptRole::User,
                Role::Model => PromptRole::Model,
            };
            blocks.push(PromptBlock {
                role,
                content: msg.content.clone(),
            });
        }

        normalize_alternation(blocks)
    }
}

/// Merge consecutive same-role blocks so roles strictly alternate.
fn normalize_alternation(blocks: Vec<PromptBlock>) -> Vec<PromptBlock> {
    let mut merged: Vec<PromptBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match merged.last_mut() {
            Some(prev) if prev.role == block.role => {
                prev.content.push_str("\n\n");
                prev.content.push_str(&block.content);
            }
            _ => merged.push(block),
        }
    }
    merged
}
