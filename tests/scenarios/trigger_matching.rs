//! Test: which refs start runs

use crate::helpers::*;
use tagship::core::config::ReleaseConfig;
use tagship::core::{EnvironmentName, ErrorKind, RunState, Stage};

#[tokio::test]
async fn test_release_candidate_tag_starts_nothing() {
    let harness = Harness::new();

    let runs = harness.dispatch("release-candidate").await;

    assert!(runs.is_empty());
    assert!(harness.events().is_empty());
    assert_eq!(harness.source.calls(), 0);
    assert_eq!(harness.builder.calls(), 0);
}

#[tokio::test]
async fn test_branch_push_starts_nothing() {
    let harness = Harness::new();

    let runs = harness.dispatch("refs/heads/v2-maintenance").await;

    assert!(runs.is_empty());
    assert_eq!(harness.builder.calls(), 0);
}

#[tokio::test]
async fn test_tag_starts_one_run_per_pipeline() {
    let harness = Harness::new();

    let runs = harness.dispatch("refs/tags/v2.0.0").await;

    let environments: Vec<EnvironmentName> = runs.iter().map(|r| r.environment).collect();
    assert_eq!(
        environments,
        vec![EnvironmentName::Staging, EnvironmentName::Production]
    );
    assert!(runs.iter().all(|r| r.trigger_ref() == "v2.0.0"));
}

#[tokio::test]
async fn test_unconfigured_environment_fails_at_binding() {
    let mut harness = Harness::new();
    harness.config = ReleaseConfig::from_yaml(
        r#"
name: "demo"
build:
  command: ["python", "-m", "build"]
publish:
  command: ["twine", "upload", "{{ artifact }}"]
environments:
  staging:
    registry_url: "staging-registry"
    credential_scope: "project:demo"
    trust: { repository: "acme/demo", workflow: "release.yml", environment: "staging" }
pipelines:
  - { name: "publish-staging", environment: staging }
  - { name: "publish-production", environment: production }
"#,
    )
    .unwrap();
    assert_eq!(harness.config.unconfigured_pipelines().unwrap().len(), 1);

    let runs = harness.dispatch("v1.2.0").await;

    let production = run_for(&runs, EnvironmentName::Production);
    let failure = production.failure().unwrap();
    assert_eq!(failure.stage, Stage::Environment);
    assert_eq!(failure.from, RunState::Matched);
    assert_eq!(failure.kind, ErrorKind::EnvironmentUnconfigured);
    assert!(run_for(&runs, EnvironmentName::Staging).is_published());
    assert_eq!(harness.builder.calls(), 1);
}

#[tokio::test]
async fn test_default_pipelines_fail_missing_environment_at_binding() {
    let mut harness = Harness::new();
    harness.config = ReleaseConfig::from_yaml(
        r#"
name: "demo"
build:
  command: ["python", "-m", "build"]
publish:
  command: ["twine", "upload", "{{ artifact }}"]
environments:
  staging:
    registry_url: "staging-registry"
    credential_scope: "project:demo"
    trust: { repository: "acme/demo", workflow: "release.yml", environment: "staging" }
"#,
    )
    .unwrap();

    let runs = harness.dispatch("v1.2.0").await;

    assert_eq!(runs.len(), 2);
    assert!(run_for(&runs, EnvironmentName::Staging).is_published());
    let failure = run_for(&runs, EnvironmentName::Production).failure().unwrap();
    assert_eq!(failure.stage, Stage::Environment);
    assert_eq!(failure.kind, ErrorKind::EnvironmentUnconfigured);
    assert_eq!(harness.builder.calls(), 1);
}
