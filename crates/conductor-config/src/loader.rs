//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::{ConductorConfig, LOG_LEVELS};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load full configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<ConductorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    ConductorConfig::from_yaml_str(&content)
}

pub(crate) fn validate_config(config: &ConductorConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    if config.orchestrator.max_iterations == 0 {
        return Err(ConfigError::Invalid(
            "orchestrator.max_iterations must be >= 1".to_string(),
        ));
    }

    match config.executor.step_timeout_ms {
        None => {
            return Err(ConfigError::Invalid(
                "executor.step_timeout_ms must be set".to_string(),
            ))
        }
        Some(0) => {
            return Err(ConfigError::Invalid(
                "executor.step_timeout_ms must be > 0".to_string(),
            ))
        }
        Some(_) => {}
    }

    if config.executor.max_parallel == 0 {
        return Err(ConfigError::Invalid(
            "executor.max_parallel must be >= 1".to_string(),
        ));
    }

    let level = config.observability.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::Invalid(format!(
            "observability.log_level '{}' is not one of {}",
            config.observability.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const FULL: &str = r#"
version: 1
app:
  name: field-ops
  environment: production
orchestrator:
  max_iterations: 5
executor:
  step_timeout_ms: 1500
  max_parallel: 8
observability:
  log_level: debug
  traces_enabled: true
  log_file: logs/conductor.log
"#;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(FULL.as_bytes()).expect("write config");

        let config = load_config(file.path()).expect("load");
        assert_eq!(config.app.name, "field-ops");
        assert_eq!(config.orchestrator.max_iterations, 5);
        assert_eq!(
            config.executor.step_timeout(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(config.executor.max_parallel, 8);
        assert!(config.observability.traces_enabled);
        assert_eq!(
            config.observability.log_file.as_deref(),
            Some("logs/conductor.log")
        );
    }

    #[test]
    fn test_sections_default_when_omitted() {
        let config =
            ConductorConfig::from_yaml_str("executor:\n  step_timeout_ms: 200\n").expect("parse");
        assert_eq!(config.version, 1);
        assert_eq!(config.app.name, "conductor");
        assert_eq!(config.orchestrator.max_iterations, 3);
        assert_eq!(config.executor.max_parallel, 4);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_step_timeout_is_required() {
        let config = ConductorConfig::default();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(msg)) if msg.contains("step_timeout_ms")
        ));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for yaml in [
            "version: 0\nexecutor:\n  step_timeout_ms: 10\n",
            "orchestrator:\n  max_iterations: 0\nexecutor:\n  step_timeout_ms: 10\n",
            "executor:\n  step_timeout_ms: 0\n",
            "executor:\n  step_timeout_ms: 10\n  max_parallel: 0\n",
            "app:\n  name: '  '\nexecutor:\n  step_timeout_ms: 10\n",
            "executor:\n  step_timeout_ms: 10\nobservability:\n  log_level: loud\n",
        ] {
            assert!(
                matches!(
                    ConductorConfig::from_yaml_str(yaml),
                    Err(ConfigError::Invalid(_))
                ),
                "expected rejection for {:?}",
                yaml
            );
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(matches!(
            load_config(&dir.path().join("absent.yaml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        assert!(matches!(
            ConductorConfig::from_yaml_str("executor: [unclosed"),
            Err(ConfigError::Parse(_))
        ));
    }
}
