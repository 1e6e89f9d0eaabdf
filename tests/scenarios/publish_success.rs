//! Test: a version tag publishes to both environments

use crate::helpers::*;
use tagship::core::{EnvironmentName, RunState, Stage, StageOutcome};
use tagship::execution::EventKind;

#[tokio::test]
async fn test_version_tag_publishes_to_staging() {
    let harness = Harness::new();

    let runs = harness.dispatch("refs/tags/v1.2.0").await;

    let staging = run_for(&runs, EnvironmentName::Staging);
    assert_eq!(staging.state(), RunState::Published);
    assert_eq!(staging.trigger_ref(), "v1.2.0");
    assert!(staging.failure().is_none());

    let stages: Vec<Stage> = staging.stages().iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Trigger,
            Stage::Environment,
            Stage::Build,
            Stage::Authorize,
            Stage::Publish
        ]
    );
    match &staging.stages()[1].outcome {
        StageOutcome::Succeeded { detail } => {
            assert_eq!(detail.as_deref(), Some("staging-registry"))
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let uploads = harness.registry.uploads().await;
    let staged: Vec<_> = uploads
        .iter()
        .filter(|u| u.registry == "staging-registry")
        .collect();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].file_name, "demo-1.2.0.tar.gz");
    assert_eq!(staged[0].content_hash, ARTIFACT_HASH);
}

#[tokio::test]
async fn test_approved_production_run_publishes_independently() {
    let harness = Harness::new();

    let runs = harness.dispatch("v1.2.0").await;

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].pipeline, "publish-staging");
    assert_eq!(runs[1].pipeline, "publish-production");
    assert!(runs.iter().all(|r| r.is_published()));
    assert_ne!(runs[0].run_id, runs[1].run_id);

    let production = run_for(&runs, EnvironmentName::Production);
    assert!(production.stages().iter().any(|s| s.stage == Stage::Approval));

    let mut registries: Vec<String> = harness
        .registry
        .uploads()
        .await
        .into_iter()
        .map(|u| u.registry)
        .collect();
    registries.sort();
    assert_eq!(registries, vec!["production-registry", "staging-registry"]);
    assert_eq!(harness.issuer.calls(), 2);
}

#[tokio::test]
async fn test_token_audience_matches_each_environment() {
    let harness = Harness::new();

    harness.dispatch("v1.2.0").await;

    for upload in harness.registry.uploads().await {
        assert!(harness.issuer.registries().contains(&upload.registry));
    }
    let mut requested = harness.issuer.registries();
    requested.sort();
    assert_eq!(requested, vec!["production-registry", "staging-registry"]);
}

#[tokio::test]
async fn test_artifact_hash_reported_before_upload() {
    let harness = Harness::new();

    harness.dispatch("v1.2.0").await;

    let events = harness.events_for("publish-staging", |k| {
        matches!(
            k,
            EventKind::ArtifactHash { .. } | EventKind::ArtifactPublished { .. }
        )
    });
    assert_eq!(events.len(), 2);
    match &events[0] {
        EventKind::ArtifactHash { file_name, sha256 } => {
            assert_eq!(file_name, "demo-1.2.0.tar.gz");
            assert_eq!(sha256, ARTIFACT_HASH);
        }
        other => panic!("expected hash first, got {:?}", other),
    }
    assert!(matches!(events[1], EventKind::ArtifactPublished { .. }));
}

#[tokio::test]
async fn test_run_report_never_contains_token() {
    let harness = Harness::new();

    let runs = harness.dispatch("v1.2.0").await;

    let report = serde_json::to_string(&runs).unwrap();
    let events = serde_json::to_string(&harness.events()).unwrap();
    assert!(!report.contains("local-"));
    assert!(!events.contains("local-"));
}
