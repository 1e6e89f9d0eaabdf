//! Progress events emitted while a release run executes

use crate::core::{EnvironmentName, ErrorKind, RunState, Stage};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Something that happened to one run
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseEvent {
    pub run_id: Uuid,
    pub pipeline: String,
    pub environment: EnvironmentName,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        trigger_ref: String,
    },
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        state: RunState,
    },
    ApprovalRequired,
    ArtifactHash {
        file_name: String,
        sha256: String,
    },
    ArtifactPublished {
        file_name: String,
        registry: String,
    },
    ArtifactSkipped {
        file_name: String,
        registry: String,
    },
    RunFailed {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },
    RunCompleted {
        state: RunState,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ReleaseEvent) + Send + Sync>;
