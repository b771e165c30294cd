//! # Conductor Core
//!
//! Core abstractions and deterministic logic for the Plan-Act-Verify engine.
//!
//! This crate contains:
//! - Tool / ToolCatalog definitions
//! - Plan / Step / outcome definitions
//! - Plan normalization and DAG execution
//! - Planner and Verifier contracts
//!
//! This crate does NOT care about:
//! - How a request reaches the engine
//! - Which model backs the planner or verifier
//! - How results are displayed

pub mod binding;
pub mod executor;
pub mod normalizer;
pub mod planner;
pub mod tool;
pub mod types;
pub mod verifier;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::executor::{
        DagNode, ExecutionDag, ExecutionProgressEvent, ExecutionProgressReporter, Executor,
        ExecutorContext,
    };
    pub use crate::normalizer::{NormalizedPlan, PlanNormalizer, PlanRejection, PlanValidator};
    pub use crate::planner::{PlanError, PlanRequest, Planner, PlannerOutput};
    pub use crate::tool::{
        CancellationToken, Tool, ToolCatalog, ToolContext, ToolDescriptor, ToolError,
        ToolFailure, ToolInput,
    };
    pub use crate::types::{
        Plan, PlanOutcome, SkipReason, Step, StepFailure, StepId, StepIoBinding, StepOutcome,
        StepStatus,
    };
    pub use crate::verifier::{
        StepStatusVerifier, Verdict, Verifier, VerifierGateway, VerifyError, VerifyRequest,
    };
}

// Re-export key types at crate root
pub use executor::{ExecutionProgressEvent, ExecutionProgressReporter, Executor, ExecutorContext};
pub use normalizer::{PlanNormalizer, PlanRejection};
pub use planner::{PlanError, PlanRequest, Planner, PlannerOutput};
pub use tool::{Tool, ToolCatalog, ToolDescriptor, ToolError, ToolFailure};
pub use types::{Plan, PlanOutcome, Step, StepId, StepStatus};
pub use verifier::{Verdict, Verifier, VerifierGateway, VerifyError};
