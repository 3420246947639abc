// Configuration structs
//
// Every table rejects unknown keys and every field has a default, so a
// partial looper.toml is always valid and a typo is always an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::constants::*;
use crate::client::models;
use crate::errors::{LooperError, Result};

/// Chat-completion backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL; requests go to `{base_url}/chat/completions`
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// Inline credential pool. Empty = recover from env / key files.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_keys: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            api_keys: Vec::new(),
        }
    }
}

/// Optimization loop policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    /// Iteration ceiling; the loop completes after this many iterations
    pub max_iterations: u32,
    /// Delay between iterations
    pub iteration_interval_secs: u64,
    /// Commit approved changes. When false the commit phase is a no-op.
    pub auto_apply: bool,
    /// Time budget for each backend call made by a phase
    pub phase_timeout_secs: u64,
    /// Extra attempts for a phase call that fails transiently (0 = none)
    pub phase_retries: u32,
    /// Base delay for phase retries, doubled per attempt
    pub retry_delay_ms: u64,
    /// Passed to the plan call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<String>,
    /// Passed to the review call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_criteria: Option<String>,
    /// Iteration reports kept in memory per loop
    pub report_history: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            iteration_interval_secs: 3600,
            auto_apply: false,
            phase_timeout_secs: 300,
            phase_retries: 0,
            retry_delay_ms: 1000,
            constraints: None,
            review_criteria: None,
            report_history: 20,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(LooperError::Config("loop.max_iterations must be greater than 0".into()));
        }
        if self.phase_timeout_secs == 0 {
            return Err(LooperError::Config(
                "loop.phase_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.iteration_interval_secs)
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs)
    }
}

/// Target project layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub path: PathBuf,
    /// Goal document, relative to `path` unless absolute
    pub goals_file: PathBuf,
    /// Write goals back when a loop ends
    pub save_goals: bool,
    /// Where generated changes are written, relative to `path`
    pub proposals_dir: PathBuf,
    /// Per-loop JSONL activity logs, relative to `path`. None disables them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_log_dir: Option<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            goals_file: PathBuf::from("looper/goals.toml"),
            save_goals: false,
            proposals_dir: PathBuf::from(".looper/proposals"),
            event_log_dir: Some(PathBuf::from(".looper/events")),
        }
    }
}

impl ProjectConfig {
    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.path.join(p)
        }
    }

    pub fn goals_path(&self) -> PathBuf {
        self.resolve(&self.goals_file)
    }

    pub fn proposals_path(&self) -> PathBuf {
        self.resolve(&self.proposals_dir)
    }

    pub fn event_log_path(&self) -> Option<PathBuf> {
        self.event_log_dir.as_deref().map(|p| self.resolve(p))
    }
}

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:50051")
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_HTTP_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset (e.g. "info", "looper=debug")
    pub level: String,
    /// Also write logs to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LooperConfig {
    pub api: ApiConfig,
    #[serde(rename = "loop")]
    pub looping: LoopConfig,
    pub project: ProjectConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl LooperConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: LooperConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate numeric ranges and formats
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(LooperError::Config("api.base_url must not be empty".into()));
        }
        if self.api.model.trim().is_empty() {
            return Err(LooperError::Config("api.model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.api.temperature) {
            return Err(LooperError::Config(format!(
                "api.temperature ({}) must be between 0.0 and 2.0",
                self.api.temperature
            )));
        }
        if self.api.max_tokens == 0 {
            return Err(LooperError::Config("api.max_tokens must be greater than 0".into()));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(LooperError::Config(
                "api.request_timeout_secs must be greater than 0".into(),
            ));
        }
        self.looping.validate()?;
        if !self.server.bind_address.contains(':') {
            return Err(LooperError::Config(format!(
                "Invalid bind address '{}': expected IP:PORT",
                self.server.bind_address
            )));
        }

        match models::lookup(&self.api.model) {
            Some(info) if self.api.max_tokens as usize > info.context => {
                tracing::warn!(
                    "api.max_tokens ({}) exceeds the context window of {} ({})",
                    self.api.max_tokens,
                    info.id,
                    info.context
                );
            }
            Some(_) => {}
            None => tracing::warn!("Model '{}' is not in the known model catalog", self.api.model),
        }

        Ok(())
    }
}
