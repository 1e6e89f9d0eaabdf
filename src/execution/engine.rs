//! Release engine: drives one run through its stages

use crate::build::{Builder, SourceProvider};
use crate::core::{
    Artifact, BuildError, Environment, EnvironmentBinder, PipelineRun, PublishToken, RejectReason,
    ReleaseError, RunContext, RunState, Stage,
};
use crate::execution::approval::{ApprovalDecision, ApprovalGate};
use crate::execution::broker::CredentialBroker;
use crate::execution::cancel::CancellationFlag;
use crate::execution::events::{EventHandler, EventKind, ReleaseEvent};
use crate::registry::{PublishOutcome, Registry};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The collaborators every run talks to
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SourceProvider>,
    pub builder: Arc<dyn Builder>,
    pub broker: CredentialBroker,
    pub registry: Arc<dyn Registry>,
    pub approval: Arc<dyn ApprovalGate>,
}

/// Engine policy knobs
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Emit each artifact's sha256 before uploading it
    pub verify_hashes: bool,
    /// Treat `AlreadyExists` as a skipped artifact instead of a failure
    pub skip_existing: bool,
    /// `None` waits for approval indefinitely
    pub approval_timeout: Option<Duration>,
    /// Parent of every run's scratch directory
    pub scratch_root: PathBuf,
    /// Leave scratch directories behind for inspection
    pub keep_scratch: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            verify_hashes: true,
            skip_existing: false,
            approval_timeout: None,
            scratch_root: std::env::temp_dir().join("tagship"),
            keep_scratch: false,
        }
    }
}

/// A stage failure on its way into the run record
struct StageFailure {
    stage: Stage,
    started_at: DateTime<Utc>,
    error: ReleaseError,
}

trait AtStage<T> {
    fn at_stage(self, stage: Stage, started_at: DateTime<Utc>) -> Result<T, StageFailure>;
}

impl<T, E: Into<ReleaseError>> AtStage<T> for Result<T, E> {
    fn at_stage(self, stage: Stage, started_at: DateTime<Utc>) -> Result<T, StageFailure> {
        self.map_err(|e| StageFailure {
            stage,
            started_at,
            error: e.into(),
        })
    }
}

/// Main release engine
///
/// Runs share nothing but the engine's read-only configuration and
/// collaborators, so any number may execute concurrently.
pub struct ReleaseEngine {
    binder: EnvironmentBinder,
    collaborators: Collaborators,
    settings: EngineSettings,
    cancel: CancellationFlag,
    event_handlers: Vec<EventHandler>,
}

impl ReleaseEngine {
    pub fn new(binder: EnvironmentBinder, collaborators: Collaborators) -> Self {
        Self {
            binder,
            collaborators,
            settings: EngineSettings::default(),
            cancel: CancellationFlag::new(),
            event_handlers: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ReleaseEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    fn emit(&self, run: &PipelineRun, kind: EventKind) {
        if self.event_handlers.is_empty() {
            return;
        }
        let event = ReleaseEvent {
            run_id: run.run_id,
            pipeline: run.pipeline.clone(),
            environment: run.environment,
            kind,
        };
        for handler in &self.event_handlers {
            handler(&event);
        }
    }

    /// Execute a run to a terminal state and hand it back
    pub async fn execute(&self, mut run: PipelineRun) -> PipelineRun {
        info!(
            "Starting run {} ({} -> {})",
            run.run_id,
            run.trigger_ref(),
            run.environment
        );
        self.emit(
            &run,
            EventKind::RunStarted {
                trigger_ref: run.trigger_ref().to_string(),
            },
        );

        let scratch = self.settings.scratch_root.join(run.run_id.to_string());
        let result = self.drive(&mut run, &scratch).await;

        if !self.settings.keep_scratch && tokio::fs::metadata(&scratch).await.is_ok() {
            if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
                warn!("Could not remove scratch directory {}: {}", scratch.display(), e);
            }
        }

        match result {
            Ok(()) => {
                info!("Run {} published to {}", run.run_id, run.environment);
                self.emit(&run, EventKind::RunCompleted { state: run.state() });
            }
            Err(failure) => {
                error!(
                    "Run {} failed at {} stage: {}",
                    run.run_id, failure.stage, failure.error
                );
                run.fail(failure.stage, failure.started_at, &failure.error);
                self.emit(
                    &run,
                    EventKind::RunFailed {
                        stage: failure.stage,
                        kind: failure.error.kind(),
                        message: failure.error.to_string(),
                    },
                );
            }
        }
        run
    }

    fn check_cancelled(&self, stage: Stage) -> Result<(), StageFailure> {
        if self.cancel.is_cancelled() {
            return Err(StageFailure {
                stage,
                started_at: Utc::now(),
                error: ReleaseError::Cancelled(stage),
            });
        }
        Ok(())
    }

    fn begin(&self, run: &PipelineRun, stage: Stage) -> Result<DateTime<Utc>, StageFailure> {
        self.check_cancelled(stage)?;
        debug!("Run {} entering {} stage", run.run_id, stage);
        self.emit(run, EventKind::StageStarted { stage });
        Ok(Utc::now())
    }

    fn complete(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        started_at: DateTime<Utc>,
        detail: String,
    ) -> Result<(), StageFailure> {
        run.advance(stage, started_at, Some(detail))
            .at_stage(stage, started_at)?;
        self.emit(
            run,
            EventKind::StageCompleted {
                stage,
                state: run.state(),
            },
        );
        Ok(())
    }

    async fn drive(&self, run: &mut PipelineRun, scratch: &Path) -> Result<(), StageFailure> {
        if run.state() == RunState::Idle {
            let started = self.begin(run, Stage::Trigger)?;
            let detail = format!("tag {}", run.trigger_ref());
            self.complete(run, Stage::Trigger, started, detail)?;
        }

        let started = self.begin(run, Stage::Environment)?;
        let environment = self
            .binder
            .resolve(run.environment)
            .at_stage(Stage::Environment, started)?;
        self.complete(run, Stage::Environment, started, environment.registry_url.clone())?;

        if environment.requires_approval {
            self.await_approval(run, &environment).await?;
        }

        let started = self.begin(run, Stage::Build)?;
        let artifacts = self
            .build(run, &environment, scratch)
            .await
            .at_stage(Stage::Build, started)?;
        self.complete(run, Stage::Build, started, format!("{} artifact(s)", artifacts.len()))?;

        let started = self.begin(run, Stage::Authorize)?;
        let token = self
            .collaborators
            .broker
            .authorize(run, &environment)
            .await
            .at_stage(Stage::Authorize, started)?;
        self.complete(run, Stage::Authorize, started, format!("token for {}", token.audience()))?;

        let started = self.begin(run, Stage::Publish)?;
        let published = self
            .publish(run, &environment, &artifacts, token)
            .await
            .at_stage(Stage::Publish, started)?;
        if self.cancel.is_cancelled() {
            warn!(
                "Run {} was cancelled during publish; uploads already accepted are permanent",
                run.run_id
            );
        }
        self.complete(
            run,
            Stage::Publish,
            started,
            format!("{} artifact(s) to {}", published, environment.registry_url),
        )
    }

    async fn await_approval(
        &self,
        run: &mut PipelineRun,
        environment: &Environment,
    ) -> Result<(), StageFailure> {
        let started = self.begin(run, Stage::Approval)?;
        info!("Run {} waiting for approval to publish to {}", run.run_id, environment.name);
        self.emit(run, EventKind::ApprovalRequired);

        let pending: &PipelineRun = run;
        let wait = async {
            let decision = self.collaborators.approval.decide(pending, environment);
            match self.settings.approval_timeout {
                Some(limit) => tokio::time::timeout(limit, decision).await.ok(),
                None => Some(decision.await),
            }
        };

        let decision = tokio::select! {
            decision = wait => decision,
            _ = self.cancel.cancelled() => {
                return Err(StageFailure {
                    stage: Stage::Approval,
                    started_at: started,
                    error: ReleaseError::Cancelled(Stage::Approval),
                });
            }
        };

        match decision {
            Some(ApprovalDecision::Approved) => {
                self.complete(run, Stage::Approval, started, "approved".to_string())
            }
            Some(ApprovalDecision::Denied(reason)) => Err(StageFailure {
                stage: Stage::Approval,
                started_at: started,
                error: ReleaseError::ApprovalDenied {
                    environment: environment.name.to_string(),
                    reason,
                },
            }),
            None => Err(StageFailure {
                stage: Stage::Approval,
                started_at: started,
                error: ReleaseError::ApprovalTimeout {
                    environment: environment.name.to_string(),
                    secs: self
                        .settings
                        .approval_timeout
                        .map(|d| d.as_secs())
                        .unwrap_or_default(),
                },
            }),
        }
    }

    async fn build(
        &self,
        run: &PipelineRun,
        environment: &Environment,
        scratch: &Path,
    ) -> Result<Vec<Artifact>, BuildError> {
        tokio::fs::create_dir_all(scratch).await?;

        let source = self
            .collaborators
            .source
            .checkout(run.trigger_ref(), scratch)
            .await?;

        let context = RunContext::for_run(run.trigger_ref(), environment.name.as_str())
            .with_variable("registry_url", environment.registry_url.as_str())
            .with_variable("run_id", run.run_id.to_string());

        let artifacts = self
            .collaborators
            .builder
            .build(&source, &scratch.join("dist"), &context)
            .await?;
        if artifacts.is_empty() {
            return Err(BuildError::NoArtifacts(source.root.display().to_string()));
        }
        Ok(artifacts)
    }

    /// Upload every artifact; the token is consumed and dropped here
    async fn publish(
        &self,
        run: &PipelineRun,
        environment: &Environment,
        artifacts: &[Artifact],
        token: PublishToken,
    ) -> Result<usize, ReleaseError> {
        let first = artifacts
            .first()
            .map(|a| a.file_name())
            .unwrap_or_default();

        if token.audience() != environment.registry_url {
            return Err(ReleaseError::PublishRejected {
                artifact: first,
                reason: RejectReason::AudienceMismatch,
            });
        }

        let mut published = 0;
        for artifact in artifacts {
            let file_name = artifact.file_name();

            if token.is_expired_at(Utc::now()) {
                return Err(ReleaseError::PublishRejected {
                    artifact: file_name,
                    reason: RejectReason::TokenExpired,
                });
            }

            if self.settings.verify_hashes {
                info!("{} sha256:{}", file_name, artifact.content_hash);
                self.emit(
                    run,
                    EventKind::ArtifactHash {
                        file_name: file_name.clone(),
                        sha256: artifact.content_hash.clone(),
                    },
                );
            }

            match self.collaborators.registry.publish(artifact, &token).await {
                PublishOutcome::Accepted => {
                    published += 1;
                    self.emit(
                        run,
                        EventKind::ArtifactPublished {
                            file_name,
                            registry: token.audience().to_string(),
                        },
                    );
                }
                PublishOutcome::Rejected(RejectReason::AlreadyExists)
                    if self.settings.skip_existing =>
                {
                    warn!("{} already exists on {}, skipping", file_name, token.audience());
                    self.emit(
                        run,
                        EventKind::ArtifactSkipped {
                            file_name,
                            registry: token.audience().to_string(),
                        },
                    );
                }
                PublishOutcome::Rejected(reason) => {
                    warn!("{} rejected by {}: {}", file_name, token.audience(), reason);
                    return Err(ReleaseError::PublishRejected {
                        artifact: file_name,
                        reason,
                    });
                }
            }
        }
        Ok(published)
    }
}
