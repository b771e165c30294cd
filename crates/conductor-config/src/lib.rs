//! # Conductor Config
//!
//! Single-file configuration for the conductor runtime.
//! One `conductor.yaml` configures the orchestration loop, the executor and
//! observability settings.

mod loader;

pub use loader::{load_config, ConfigError};

use std::time::Duration;

use serde::Deserialize;

/// Log levels accepted by `observability.log_level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level configuration schema.
#[derive(Debug, Clone, Deserialize)]
pub struct ConductorConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            orchestrator: OrchestratorSection::default(),
            executor: ExecutorSection::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ConductorConfig {
    /// Parse and validate YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ConductorConfig = serde_yaml::from_str(content)?;
        loader::validate_config(&config)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_env(),
        }
    }
}

fn default_app_name() -> String {
    "conductor".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

/// Plan-act-verify loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// Upper bound on planner calls per orchestration
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_max_iterations() -> u32 {
    3
}

/// Step execution settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    /// Per-step timeout in milliseconds. Required; there is no default.
    #[serde(default)]
    pub step_timeout_ms: Option<u64>,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            step_timeout_ms: None,
            max_parallel: default_max_parallel(),
        }
    }
}

impl ExecutorSection {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_ms.map(Duration::from_millis)
    }
}

fn default_max_parallel() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub traces_enabled: bool,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            traces_enabled: false,
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
