//! Pipeline run domain model

use crate::core::environment::EnvironmentName;
use crate::core::error::{ReleaseError, TransitionError};
use crate::core::state::{RunFailure, RunState, Stage, StageOutcome, StageResult};
use crate::core::trigger::RunRequest;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One release attempt for one (tag, environment) pair
///
/// The run owns its own progress only; it is discarded once the operator
/// has seen the report.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub pipeline: String,
    trigger_ref: String,
    pub environment: EnvironmentName,
    state: RunState,
    stages: Vec<StageResult>,
    failure: Option<RunFailure>,
    #[serde(skip)]
    token_minted: bool,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create an idle run for a trigger match
    pub fn new(request: &RunRequest) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: request.pipeline.clone(),
            trigger_ref: request.trigger_ref.clone(),
            environment: request.environment,
            state: RunState::Idle,
            stages: Vec::new(),
            failure: None,
            token_minted: false,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Create a run that has already passed the trigger stage
    pub fn matched(request: &RunRequest) -> Self {
        let mut run = Self::new(request);
        let now = Utc::now();
        // Idle -> Matched is always legal on a fresh run
        let _ = run.advance(Stage::Trigger, now, Some(format!("tag {}", request.trigger_ref)));
        run
    }

    pub fn trigger_ref(&self) -> &str {
        &self.trigger_ref
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    pub fn is_published(&self) -> bool {
        self.state == RunState::Published
    }

    pub fn has_failed(&self) -> bool {
        self.state == RunState::Failed
    }

    /// Record a successful stage and move to the state it reaches
    pub fn advance(
        &mut self,
        stage: Stage,
        started_at: DateTime<Utc>,
        detail: Option<String>,
    ) -> Result<(), TransitionError> {
        if let Some(target) = stage.reaches() {
            if self.state.successor() != Some(target) {
                return Err(TransitionError {
                    from: self.state,
                    to: target,
                });
            }
            self.state = target;
        } else if self.state.is_terminal() {
            return Err(TransitionError {
                from: self.state,
                to: self.state,
            });
        }

        let finished_at = Utc::now();
        self.stages.push(StageResult {
            stage,
            outcome: StageOutcome::Succeeded { detail },
            started_at,
            finished_at,
        });
        if self.state.is_terminal() {
            self.finished_at = Some(finished_at);
        }
        Ok(())
    }

    /// Abort the run at `stage`; a terminal run is left untouched
    pub fn fail(&mut self, stage: Stage, started_at: DateTime<Utc>, error: &ReleaseError) {
        if self.state.is_terminal() {
            return;
        }

        let finished_at = Utc::now();
        let kind = error.kind();
        let message = error.to_string();
        self.stages.push(StageResult {
            stage,
            outcome: StageOutcome::Failed {
                kind,
                message: message.clone(),
            },
            started_at,
            finished_at,
        });
        self.failure = Some(RunFailure {
            stage,
            from: self.state,
            kind,
            message,
        });
        self.state = RunState::Failed;
        self.finished_at = Some(finished_at);
    }

    /// Claim the run's single token mint; false if already claimed
    pub fn claim_token_mint(&mut self) -> bool {
        if self.token_minted {
            return false;
        }
        self.token_minted = true;
        true
    }
}
