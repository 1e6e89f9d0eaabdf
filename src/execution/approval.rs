//! Manual approval gate for protected environments

use crate::core::{Environment, PipelineRun};
use async_trait::async_trait;
use console::{style, Term};
use tokio::sync::Mutex;
use tracing::warn;

/// A human decision on whether a run may proceed past `EnvironmentBound`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied(String),
}

/// Asks for approval; may wait indefinitely, the engine applies the timeout
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn decide(&self, run: &PipelineRun, environment: &Environment) -> ApprovalDecision;
}

/// Answers every request the same way
#[derive(Debug, Clone)]
pub struct PresetApproval(ApprovalDecision);

impl PresetApproval {
    pub fn approve() -> Self {
        Self(ApprovalDecision::Approved)
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self(ApprovalDecision::Denied(reason.into()))
    }
}

#[async_trait]
impl ApprovalGate for PresetApproval {
    async fn decide(&self, _run: &PipelineRun, _environment: &Environment) -> ApprovalDecision {
        self.0.clone()
    }
}

/// Never answers; the run waits until the approval timeout or cancellation
#[derive(Debug, Clone, Default)]
pub struct PendingApproval;

#[async_trait]
impl ApprovalGate for PendingApproval {
    async fn decide(&self, _run: &PipelineRun, _environment: &Environment) -> ApprovalDecision {
        std::future::pending().await
    }
}

/// Prompts the operator on the terminal, one run at a time
#[derive(Debug, Default)]
pub struct PromptApproval {
    lock: Mutex<()>,
}

impl PromptApproval {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalGate for PromptApproval {
    async fn decide(&self, run: &PipelineRun, environment: &Environment) -> ApprovalDecision {
        let _guard = self.lock.lock().await;

        let question = format!(
            "Publish {} to {} ({})? [y/N] ",
            style(run.trigger_ref()).bold(),
            style(environment.name).cyan(),
            environment.registry_url
        );

        let answer = tokio::task::spawn_blocking(move || {
            let term = Term::stderr();
            term.write_str(&question)?;
            term.read_line()
        })
        .await;

        match answer {
            Ok(Ok(line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes") => {
                ApprovalDecision::Approved
            }
            Ok(Ok(_)) => ApprovalDecision::Denied("operator declined".to_string()),
            Ok(Err(e)) => {
                warn!("Could not read approval from terminal: {}", e);
                ApprovalDecision::Denied("no terminal available for approval".to_string())
            }
            Err(e) => {
                warn!("Approval prompt task failed: {}", e);
                ApprovalDecision::Denied("approval prompt failed".to_string())
            }
        }
    }
}
