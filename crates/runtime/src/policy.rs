//! Capability gating by active mode.
//!
//! A pure, total mapping from (mode, capability name) to allow/deny.
//! Evaluated fresh on every tool call — the active mode can change per
//! request, so decisions are never cached on a session.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tools::{FILE_WRITE, SHELL_EXECUTE};

/// Behavioral/capability profile selected for a single request.
/// Carried through one turn only; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveMode {
    /// Conversational only — no tool access at all.
    Chat,
    /// Full development mode.
    Dev,
    /// Read-and-fetch mode for web research.
    Research,
    /// Read-only analytical mode (finance/marketing style analysis).
    Analyst,
    /// Autonomous mode — the model decides freely.
    Auto,
}

impl ActiveMode {
    /// Parse a caller-supplied mode tag. Unknown tags fall back to `Auto`.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "CHAT" => Self::Chat,
            "DEV" => Self::Dev,
            "RESEARCH" => Self::Research,
            "ANALYST" | "CFO" | "CMO" | "INVOICE" => Self::Analyst,
            _ => Self::Auto,
        }
    }
}

impl fmt::Display for ActiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Chat => "CHAT",
            Self::Dev => "DEV",
            Self::Research => "RESEARCH",
            Self::Analyst => "ANALYST",
            Self::Auto => "AUTO",
        };
        write!(f, "{tag}")
    }
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    Denied { reason: String },
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Capabilities that mutate the external environment.
fn is_mutating(capability: &str) -> bool {
    matches!(capability, FILE_WRITE | SHELL_EXECUTE)
}

/// Decide whether `capability` may run under `mode`.
///
/// - `Chat` denies everything tool-related.
/// - `Research` and `Analyst` deny mutating capabilities, allow the rest
///   (reads, fetches, and remote tools).
/// - `Dev` and `Auto` allow every registered capability.
pub fn evaluate(mode: ActiveMode, capability: &str) -> PolicyDecision {
    match mode {
        ActiveMode::Chat => PolicyDecision::Denied {
            reason: format!("mode {mode} does not permit tool use"),
        },
        ActiveMode::Research | ActiveMode::Analyst => {
            if is_mutating(capability) {
                PolicyDecision::Denied {
                    reason: format!("mode {mode} is read-only and does not permit '{capability}'"),
                }
            } else {
                PolicyDecision::Allowed
            }
        }
        ActiveMode::Dev | ActiveMode::Auto => PolicyDecision::Allowed,
    }
}
