//! Verifier abstractions.
//!
//! A verifier judges whether a plan outcome satisfies the goal. "Not
//! satisfied" is an ordinary verdict; errors are reserved for a broken
//! verification capability.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::planner::extract_json;
use crate::types::PlanOutcome;

/// External judgment of a plan outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub satisfied: bool,
    /// Human-readable reason, fed into the next planning iteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn satisfied() -> Self {
        Self {
            satisfied: true,
            reason: None,
        }
    }

    pub fn unsatisfied(reason: impl Into<String>) -> Self {
        Self {
            satisfied: false,
            reason: Some(reason.into()),
        }
    }
}

/// Verifier errors.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verifier unavailable: {0}")]
    Unavailable(String),

    #[error("malformed verifier response: {0}")]
    MalformedResponse(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Input payload for verification.
#[derive(Debug, Clone, Copy)]
pub struct VerifyRequest<'a> {
    pub goal: &'a str,
    pub outcome: &'a PlanOutcome,
}

/// Verifier trait.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, request: &VerifyRequest<'_>) -> Result<Verdict, VerifyError>;
}

/// Deterministic verifier: satisfied iff every step completed.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepStatusVerifier;

#[async_trait]
impl Verifier for StepStatusVerifier {
    async fn verify(&self, request: &VerifyRequest<'_>) -> Result<Verdict, VerifyError> {
        if request.outcome.is_success() {
            Ok(Verdict::satisfied())
        } else {
            Ok(Verdict {
                satisfied: false,
                reason: None,
            })
        }
    }
}

/// Front door to the verification capability used by the orchestrator.
#[derive(Clone)]
pub struct VerifierGateway {
    verifier: Arc<dyn Verifier>,
}

impl VerifierGateway {
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self { verifier }
    }

    /// Verify `outcome` against `goal`.
    ///
    /// Unsatisfied verdicts always carry a reason; a missing one is derived
    /// from the outcome's failed and skipped steps.
    pub async fn verify(&self, goal: &str, outcome: &PlanOutcome) -> Result<Verdict, VerifyError> {
        let request = VerifyRequest { goal, outcome };
        let mut verdict = match self.verifier.verify(&request).await {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::error!(
                    run_id = %outcome.run_id,
                    plan_id = %outcome.plan_id,
                    error = %err,
                    "verifier failed"
                );
                return Err(err);
            }
        };

        if !verdict.satisfied {
            let missing = verdict
                .reason
                .as_deref()
                .map_or(true, |reason| reason.trim().is_empty());
            if missing {
                verdict.reason = Some(describe_shortfall(outcome));
            }
        }

        tracing::info!(
            run_id = %outcome.run_id,
            plan_id = %outcome.plan_id,
            satisfied = verdict.satisfied,
            reason = verdict.reason.as_deref().unwrap_or(""),
            "verification finished"
        );
        Ok(verdict)
    }
}

impl std::fmt::Debug for VerifierGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierGateway").finish_non_exhaustive()
    }
}

fn describe_shortfall(outcome: &PlanOutcome) -> String {
    let problems: Vec<String> = outcome
        .failed_steps()
        .into_iter()
        .chain(outcome.skipped_steps())
        .map(|step| step.describe())
        .collect();
    if problems.is_empty() {
        "goal not satisfied by the completed steps".to_string()
    } else {
        problems.join("; ")
    }
}

/// Decode verifier text such as `{"satisfied": false, "reason": "..."}`.
pub fn parse_verdict(text: &str) -> Result<Verdict, VerifyError> {
    let json_str = extract_json(text).ok_or_else(|| {
        VerifyError::MalformedResponse("verifier output did not contain JSON".to_string())
    })?;
    serde_json::from_str::<Verdict>(json_str)
        .map_err(|e| VerifyError::MalformedResponse(format!("invalid verdict JSON: {}", e)))
}
