use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// Runtime settings read from the environment.
///
/// Every knob has a default, so `from_env()` never fails: a bad value
/// silently falls back to the default rather than aborting startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub memory: MemoryConfig,
    pub session: SessionConfig,
    pub model: ModelConfig,
    pub tools: ToolsConfig,
}

impl RuntimeConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            memory: MemoryConfig::from_env(),
            session: SessionConfig::from_env(),
            model: ModelConfig::from_env(),
            tools: ToolsConfig::from_env(),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  memory:   max_history={}, keep_recent={}",
            self.memory.max_history,
            self.memory.keep_recent
        );
        tracing::info!("  session:  ttl_secs={}", self.session.ttl_secs);
        tracing::info!(
            "  model:    name={}, key_set={}, temperature={}, max_tokens={}, max_retries={}",
            self.model.name,
            self.model.api_key.is_some(),
            self.model.temperature,
            self.model.max_tokens,
            self.model.max_retries
        );
        tracing::info!(
            "  tools:    workspace={}, call_timeout_secs={}, discovery_interval_secs={}, servers={}",
            self.tools.workspace_dir.display(),
            self.tools.call_timeout_secs,
            self.tools.discovery_interval_secs,
            self.tools.servers.len()
        );
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            session: SessionConfig::default(),
            model: ModelConfig::default(),
            tools: ToolsConfig {
                workspace_dir: PathBuf::from("."),
                call_timeout_secs: 30,
                discovery_interval_secs: 300,
                capture_tool: Some("submit_invoice".to_string()),
                servers: Vec::new(),
            },
        }
    }
}

// ── Conversation memory ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Message count above which old turns are summarized away.
    pub max_history: usize,
    /// Raw messages retained after a summarization pass.
    pub keep_recent: usize,
}

impl MemoryConfig {
    fn from_env() -> Self {
        Self {
            max_history: env_usize("ARCHON_MAX_HISTORY", 20),
            keep_recent: env_usize("ARCHON_KEEP_RECENT", 8),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            keep_recent: 8,
        }
    }
}

// ── Sessions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle seconds before a session is reaped.
    pub ttl_secs: u64,
}

impl SessionConfig {
    fn from_env() -> Self {
        Self {
            ttl_secs: env_u64("ARCHON_SESSION_TTL_SECS", 86_400),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 86_400 }
    }
}

// ── Model collaborator ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name as the provider API expects it.
    pub name: String,
    /// API key; absent means the entry point must run without a real provider.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Attempts for transient model failures (rate limit, unavailable).
    pub max_retries: usize,
    /// First backoff delay in seconds; doubles per retry.
    pub retry_backoff_secs: u64,
}

impl ModelConfig {
    fn from_env() -> Self {
        Self {
            name: env_or("ARCHON_MODEL", "gemini-2.0-flash"),
            api_key: env_opt("ARCHON_API_KEY").or_else(|| env_opt("GEMINI_API_KEY")),
            temperature: env_f32("ARCHON_TEMPERATURE", 0.2),
            max_tokens: env_u64("ARCHON_MAX_TOKENS", 4096) as u32,
            max_retries: env_usize("ARCHON_MAX_RETRIES", 3),
            retry_backoff_secs: env_u64("ARCHON_RETRY_BACKOFF_SECS", 5),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-2.0-flash".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_secs: 5,
        }
    }
}

// ── Tools ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Working directory for file and shell tools.
    pub workspace_dir: PathBuf,
    /// Hard per-call timeout for remote tool invocations.
    pub call_timeout_secs: u64,
    /// Staleness window for the remote tool cache.
    pub discovery_interval_secs: u64,
    /// Tool name whose raw arguments are mirrored to the side channel.
    pub capture_tool: Option<String>,
    /// External tool servers to launch on startup.
    pub servers: Vec<ToolServerSpec>,
}

/// Launch spec for one external tool server subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
}

impl ToolsConfig {
    fn from_env() -> Self {
        Self {
            workspace_dir: PathBuf::from(env_or("ARCHON_WORKSPACE_DIR", ".")),
            call_timeout_secs: env_u64("ARCHON_TOOL_TIMEOUT_SECS", 30),
            discovery_interval_secs: env_u64("ARCHON_DISCOVERY_INTERVAL_SECS", 300),
            capture_tool: Some(env_or("ARCHON_CAPTURE_TOOL", "submit_invoice")),
            servers: parse_server_specs(&env_or("ARCHON_MCP_SERVERS", "")),
        }
    }
}

/// Parse `name=command arg1 arg2;name2=command2` into launch specs.
/// Malformed entries are skipped with a warning.
fn parse_server_specs(raw: &str) -> Vec<ToolServerSpec> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let (name, cmdline) = entry.split_once('=')?;
            let mut parts = cmdline.split_whitespace();
            let command = match parts.next() {
                Some(c) => c.to_string(),
                None => {
                    tracing::warn!(entry = entry, "skipping tool server spec without command");
                    return None;
                }
            };
            Some(ToolServerSpec {
                name: name.trim().to_string(),
                command,
                args: parts.map(String::from).collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.memory.max_history, 20);
        assert_eq!(config.memory.keep_recent, 8);
        assert_eq!(config.session.ttl_secs, 86_400);
        assert_eq!(config.model.max_retries, 3);
        assert_eq!(config.tools.call_timeout_secs, 30);
    }

    #[test]
    fn test_parse_server_specs() {
        let specs = parse_server_specs("erp=npx ts-node server.ts; db=python3 -m dbserver");
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "erp");
        assert_eq!(specs[0].command, "npx");
        assert_eq!(specs[0].args, vec!["ts-node", "server.ts"]);
        assert_eq!(specs[1].name, "db");
        assert_eq!(specs[1].args, vec!["-m", "dbserver"]);
    }

    #[test]
    fn test_parse_server_specs_empty_and_malformed() {
        assert!(parse_server_specs("").is_empty());
        assert!(parse_server_specs("  ;  ").is_empty());
        // No '=' separator
        assert!(parse_server_specs("just-a-name").is_empty());
    }
}
