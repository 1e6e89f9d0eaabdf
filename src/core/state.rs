//! Run state machine models

use crate::core::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single release run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    /// Run created, trigger not yet evaluated
    Idle,
    /// Trigger matched the incoming tag
    Matched,
    /// Environment resolved (and approved, if required)
    EnvironmentBound,
    /// Artifacts produced
    Built,
    /// Publish token minted
    Authorized,
    /// All artifacts accepted by the registry
    Published,
    /// Run aborted
    Failed,
}

impl RunState {
    /// Check if the run is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Published | RunState::Failed)
    }

    /// The only state a successful stage may move to from here
    pub fn successor(&self) -> Option<RunState> {
        match self {
            RunState::Idle => Some(RunState::Matched),
            RunState::Matched => Some(RunState::EnvironmentBound),
            RunState::EnvironmentBound => Some(RunState::Built),
            RunState::Built => Some(RunState::Authorized),
            RunState::Authorized => Some(RunState::Published),
            RunState::Published | RunState::Failed => None,
        }
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Trigger,
    Environment,
    Approval,
    Build,
    Authorize,
    Publish,
}

impl Stage {
    /// State reached when this stage succeeds; the approval gate holds the
    /// run in `EnvironmentBound`
    pub fn reaches(&self) -> Option<RunState> {
        match self {
            Stage::Trigger => Some(RunState::Matched),
            Stage::Environment => Some(RunState::EnvironmentBound),
            Stage::Approval => None,
            Stage::Build => Some(RunState::Built),
            Stage::Authorize => Some(RunState::Authorized),
            Stage::Publish => Some(RunState::Published),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Trigger => "trigger",
            Stage::Environment => "environment",
            Stage::Approval => "approval",
            Stage::Build => "build",
            Stage::Authorize => "authorize",
            Stage::Publish => "publish",
        };
        f.pad(name)
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    Succeeded {
        detail: Option<String>,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

/// Record appended to a run for every stage it attempted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StageOutcome::Succeeded { .. })
    }
}

/// Where and why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Stage that raised the error
    pub stage: Stage,
    /// Last state reached before failing
    pub from: RunState,
    pub kind: ErrorKind,
    pub message: String,
}
