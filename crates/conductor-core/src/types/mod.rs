//! Plan model
//!
//! Pure data shared by every component of the engine:
//! - Step: one tool invocation with dependencies and inputs
//! - Plan: the step graph produced by a planner for one goal
//! - StepOutcome / PlanOutcome: what the executor observed

mod outcome;
mod plan;
mod step;

pub use outcome::{PlanOutcome, SkipReason, StepFailure, StepOutcome, StepStatus};
pub use plan::Plan;
pub use step::{Step, StepId, StepIoBinding};
