//! Process configuration: a `minerva.toml` file with environment-variable
//! overrides — one struct per concern, each with a `Default` impl,
//! composed into a single [`AppConfig`] loaded once at process start.
//!
//! A missing config file falls back to defaults; a malformed one is a
//! [`PipelineError::Config`]: the pipeline writes to a graph database and
//! a curation store, and starting it against the wrong one is worse than
//! failing to start at all.

use std::env;
use std::fs;
use std::path::Path;

use minerva_domain::{PipelineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    /// Upper bound on in-flight `generate`/`embed` calls to the provider.
    pub max_concurrent_requests: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            max_concurrent_requests: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub db_path: String,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self { db_path: "./data/curation.redb".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub path: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self { path: "./vault".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub workflow_queue_name: String,
    pub poll_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub curation_deadline_days: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workflow_queue_name: "minerva-journal-processing".to_string(),
            poll_interval_secs: 30,
            heartbeat_interval_secs: 120,
            curation_deadline_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub llm: LlmConfig,
    pub curation: CurationConfig,
    pub vault: VaultConfig,
    pub orchestrator: OrchestratorConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from `path` (a `minerva.toml`), then apply environment
    /// overrides (`.env`, if present, is loaded by the caller via
    /// `dotenvy::dotenv()` before this runs). A missing file is fine
    /// (defaults apply); a present-but-unparseable file is a config
    /// error, never a silent fallback.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = match fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw).map_err(|e| PipelineError::config(format!("{}: {e}", path.as_ref().display())))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("GRAPH_URI") {
            self.graph.uri = v;
        }
        if let Ok(v) = env::var("GRAPH_USER") {
            self.graph.user = v;
        }
        if let Ok(v) = env::var("GRAPH_PASSWORD") {
            self.graph.password = v;
        }
        if let Ok(v) = env::var("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = env::var("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = env::var("EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = env::var("CURATION_DB_PATH") {
            self.curation.db_path = v;
        }
        if let Ok(v) = env::var("VAULT_PATH") {
            self.vault.path = v;
        }
        if let Ok(v) = env::var("WORKFLOW_QUEUE_NAME") {
            self.orchestrator.workflow_queue_name = v;
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::config(e.to_string()))?;
        }
        let rendered = toml::to_string_pretty(self).map_err(|e| PipelineError::config(e.to_string()))?;
        fs::write(path, rendered).map_err(|e| PipelineError::config(e.to_string()))?;
        Ok(())
    }
}
