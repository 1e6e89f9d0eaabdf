//! Test: publishing the same version twice

use crate::helpers::*;
use tagship::core::{EnvironmentName, ErrorKind, Stage};
use tagship::execution::{EngineSettings, EventKind};

#[tokio::test]
async fn test_rerun_is_rejected_as_already_published() {
    let harness = Harness::new();

    let first = harness.dispatch("v1.2.0").await;
    assert!(first.iter().all(|r| r.is_published()));

    let second = harness.dispatch("v1.2.0").await;
    for run in &second {
        let failure = run.failure().unwrap();
        assert_eq!(failure.stage, Stage::Publish);
        assert_eq!(failure.kind, ErrorKind::PublishRejected);
        assert!(failure.message.contains("already exists"));
    }
    assert_eq!(harness.registry.uploads().await.len(), 2);
}

#[tokio::test]
async fn test_skip_existing_treats_rerun_as_published() {
    let mut harness = Harness::new();
    harness.dispatch("v1.2.0").await;

    harness.settings = EngineSettings {
        skip_existing: true,
        ..harness.settings.clone()
    };
    let second = harness.dispatch("v1.2.0").await;

    assert!(second.iter().all(|r| r.is_published()));
    let skipped = harness.events_for("publish-staging", |k| {
        matches!(k, EventKind::ArtifactSkipped { .. })
    });
    assert_eq!(skipped.len(), 1);
    assert!(run_for(&second, EnvironmentName::Production).is_published());
}

#[tokio::test]
async fn test_new_version_publishes_after_earlier_release() {
    let harness = Harness::new();

    harness.dispatch("v1.2.0").await;
    let next = harness.dispatch("v1.2.1").await;

    assert!(next.iter().all(|r| r.is_published()));
    assert_eq!(harness.registry.uploads().await.len(), 4);
}
