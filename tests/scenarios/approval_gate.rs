//! Test: the manual approval gate in front of production

use crate::helpers::*;
use std::time::Duration;
use tagship::core::{EnvironmentName, ErrorKind, RunState, Stage};
use tagship::execution::{EngineSettings, EventKind, PendingApproval, PresetApproval};

#[tokio::test]
async fn test_denied_approval_fails_before_build() {
    let harness = Harness::new().with_approval(PresetApproval::deny("release freeze"));

    let runs = harness.dispatch("v1.2.0").await;

    let production = run_for(&runs, EnvironmentName::Production);
    assert_eq!(production.state(), RunState::Failed);
    let failure = production.failure().unwrap();
    assert_eq!(failure.stage, Stage::Approval);
    assert_eq!(failure.from, RunState::EnvironmentBound);
    assert_eq!(failure.kind, ErrorKind::ApprovalDenied);
    assert!(failure.message.contains("release freeze"));
    assert!(!production.stages().iter().any(|s| s.stage == Stage::Build));

    // Only the staging run reached the builder
    assert_eq!(harness.builder.calls(), 1);
    assert!(run_for(&runs, EnvironmentName::Staging).is_published());
}

#[tokio::test]
async fn test_approval_timeout() {
    let mut harness = Harness::new().with_approval(PendingApproval);
    harness.settings = EngineSettings {
        approval_timeout: Some(Duration::from_millis(50)),
        ..harness.settings.clone()
    };

    let runs = harness.dispatch("v1.2.0").await;

    let production = run_for(&runs, EnvironmentName::Production);
    let failure = production.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::ApprovalTimeout);
    assert_eq!(failure.from, RunState::EnvironmentBound);
    assert_eq!(harness.issuer.registries(), vec!["staging-registry"]);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_approval() {
    let harness = Harness::new().with_approval(PendingApproval);
    let cancel = harness.cancel.clone();

    let waiter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    let runs = harness.dispatch("v1.2.0").await;
    waiter.await.unwrap();

    let production = run_for(&runs, EnvironmentName::Production);
    let failure = production.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Cancelled);
    assert_eq!(failure.stage, Stage::Approval);
    assert_eq!(harness.builder.calls(), 1);
}

#[tokio::test]
async fn test_approval_required_event_emitted_once() {
    let harness = Harness::new();

    harness.dispatch("v1.2.0").await;

    let production = harness.events_for("publish-production", |k| {
        matches!(k, EventKind::ApprovalRequired)
    });
    let staging = harness.events_for("publish-staging", |k| {
        matches!(k, EventKind::ApprovalRequired)
    });
    assert_eq!(production.len(), 1);
    assert!(staging.is_empty());
}
