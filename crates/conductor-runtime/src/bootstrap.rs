//! Wiring from `conductor.yaml` to a ready orchestrator.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use conductor_config::{load_config, ConductorConfig, ConfigError, ObservabilityConfig};
use conductor_core::planner::Planner;
use conductor_core::tool::ToolCatalog;
use conductor_core::verifier::Verifier;

use crate::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};

/// Overrides `observability.log_file` when set to a non-empty path.
pub const LOG_FILE_ENV: &str = "CONDUCTOR_LOG_FILE";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Bootstrap errors
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

impl TryFrom<&ConductorConfig> for OrchestratorConfig {
    type Error = OrchestratorError;

    fn try_from(config: &ConductorConfig) -> Result<Self, Self::Error> {
        let step_timeout = config.executor.step_timeout().ok_or_else(|| {
            OrchestratorError::InvalidConfig("executor.step_timeout_ms must be set".to_string())
        })?;
        let orchestrator_config = OrchestratorConfig::new(step_timeout)
            .with_max_iterations(config.orchestrator.max_iterations)
            .with_max_parallel(config.executor.max_parallel);
        orchestrator_config.validate()?;
        Ok(orchestrator_config)
    }
}

/// Build an orchestrator from an already loaded config.
pub fn build_orchestrator(
    config: &ConductorConfig,
    planner: Arc<dyn Planner>,
    catalog: Arc<ToolCatalog>,
    verifier: Arc<dyn Verifier>,
) -> Result<Orchestrator, BootstrapError> {
    let orchestrator_config = OrchestratorConfig::try_from(config)?;
    tracing::info!(
        app = %config.app.name,
        environment = %config.app.environment,
        tools = catalog.len(),
        max_iterations = orchestrator_config.max_iterations,
        max_parallel = orchestrator_config.max_parallel,
        step_timeout_ms = orchestrator_config.step_timeout.as_millis() as u64,
        "orchestrator configured"
    );
    Ok(Orchestrator::new(
        planner,
        catalog,
        verifier,
        orchestrator_config,
    )?)
}

/// Load `path`, install tracing once per process and build the orchestrator.
pub fn orchestrator_from_config_path(
    path: impl AsRef<Path>,
    planner: Arc<dyn Planner>,
    catalog: Arc<ToolCatalog>,
    verifier: Arc<dyn Verifier>,
) -> Result<Orchestrator, BootstrapError> {
    let config = load_config(path.as_ref())?;
    init_tracing(&config.observability);
    build_orchestrator(&config, planner, catalog, verifier)
}

/// Install the global fmt subscriber. Later calls are no-ops.
///
/// `RUST_LOG` wins over `observability.log_level`.
pub fn init_tracing(observability: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let log_file = std::env::var(LOG_FILE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| observability.log_file.clone());
        let file_writer = log_file.as_deref().and_then(create_log_writer);
        let fallback_level = fallback_level(&observability.log_level);
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let span_events = if observability.traces_enabled {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_span_events(span_events);
        let _ = match file_writer {
            Some(writer) => builder.with_ansi(false).with_writer(writer).try_init(),
            None => builder.try_init(),
        };

        tracing::info!(
            log_level = fallback_level,
            traces_enabled = observability.traces_enabled,
            log_file = log_file.as_deref().unwrap_or("stderr"),
            "tracing initialized"
        );
    });
}

fn fallback_level(configured: &str) -> &'static str {
    match configured.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn create_log_writer(path: &str) -> Option<SharedFileMakeWriter> {
    let file_path = Path::new(path);
    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(err) = create_dir_all(parent) {
            eprintln!(
                "failed to create log directory '{}': {}",
                parent.display(),
                err
            );
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(file_path) {
        Ok(file) => Some(SharedFileMakeWriter {
            file: Arc::new(Mutex::new(file)),
        }),
        Err(err) => {
            eprintln!("failed to open log file '{}': {}", file_path.display(), err);
            None
        }
    }
}

/// Appends every formatted event to one shared file handle.
#[derive(Clone)]
struct SharedFileMakeWriter {
    file: Arc<Mutex<File>>,
}

struct SharedFileWriter {
    file: Arc<Mutex<File>>,
}

impl<'a> MakeWriter<'a> for SharedFileMakeWriter {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriter {
            file: self.file.clone(),
        }
    }
}

impl SharedFileWriter {
    fn with_file<T>(&self, f: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file mutex poisoned"))?;
        f(&mut file)
    }
}

impl io::Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| io::Write::write(file, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(io::Write::flush)
    }
}
