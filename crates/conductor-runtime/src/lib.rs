//! # Conductor Runtime
//!
//! Runs the plan → act → verify loop on top of `conductor-core`:
//! - `Orchestrator`: bounded iteration over planner, executor and verifier
//! - `bootstrap`: config loading, tracing setup and orchestrator wiring

pub mod bootstrap;
pub mod orchestrator;

pub use bootstrap::{
    build_orchestrator, init_tracing, orchestrator_from_config_path, BootstrapError,
};
pub use orchestrator::{
    IterationRecord, OrchestrationRequest, OrchestrationResult, OrchestrationStatus,
    Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorPhase,
};

pub use conductor_core::tool::CancellationToken;
