//! Test: a failed build never reaches the broker

use crate::helpers::*;
use tagship::core::{EnvironmentName, ErrorKind, RunState, Stage};

#[tokio::test]
async fn test_build_failure_skips_broker_and_registry() {
    let harness = Harness::new().with_builder(MockBuilder::failing_for(&[
        EnvironmentName::Staging,
        EnvironmentName::Production,
    ]));

    let runs = harness.dispatch("v1.2.0").await;

    assert_eq!(runs.len(), 2);
    for run in &runs {
        let failure = run.failure().unwrap();
        assert_eq!(failure.stage, Stage::Build);
        assert_eq!(failure.kind, ErrorKind::BuildError);
        assert_eq!(failure.from, RunState::EnvironmentBound);
        assert!(failure.message.contains("invalid pyproject.toml"));
    }
    assert_eq!(harness.issuer.calls(), 0);
    assert_eq!(harness.registry.attempts().await, 0);
}

#[tokio::test]
async fn test_production_build_failure_leaves_staging_published() {
    let harness =
        Harness::new().with_builder(MockBuilder::failing_for(&[EnvironmentName::Production]));

    let runs = harness.dispatch("v1.2.0").await;

    assert!(run_for(&runs, EnvironmentName::Staging).is_published());
    let production = run_for(&runs, EnvironmentName::Production);
    assert_eq!(production.failure().unwrap().kind, ErrorKind::BuildError);

    assert_eq!(harness.issuer.registries(), vec!["staging-registry"]);
    let uploads = harness.registry.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].registry, "staging-registry");
}
