//! Test: broker failures stop the run before any upload

use crate::helpers::*;
use tagship::core::{BrokerError, EnvironmentName, ErrorKind, RunState, Stage};

async fn assert_broker_failure(error: BrokerError, expected: ErrorKind) {
    let harness = Harness::new().with_issuer(CountingIssuer::failing(error));

    let runs = harness.dispatch("v1.2.0").await;

    let staging = run_for(&runs, EnvironmentName::Staging);
    let failure = staging.failure().unwrap();
    assert_eq!(failure.stage, Stage::Authorize);
    assert_eq!(failure.from, RunState::Built);
    assert_eq!(failure.kind, expected);

    assert!(runs.iter().all(|r| r.has_failed()));
    assert_eq!(harness.registry.attempts().await, 0);
}

#[tokio::test]
async fn test_authorization_denied() {
    assert_broker_failure(
        BrokerError::AuthorizationDenied("no trusted publisher for acme/demo".to_string()),
        ErrorKind::AuthorizationDenied,
    )
    .await;
}

#[tokio::test]
async fn test_identity_assertion_invalid() {
    assert_broker_failure(
        BrokerError::IdentityAssertionInvalid("invalid-token: token is expired".to_string()),
        ErrorKind::IdentityAssertionInvalid,
    )
    .await;
}

#[tokio::test]
async fn test_broker_unavailable() {
    assert_broker_failure(
        BrokerError::BrokerUnavailable("token endpoint returned 503".to_string()),
        ErrorKind::BrokerUnavailable,
    )
    .await;
}

#[tokio::test]
async fn test_untrusted_workflow_is_denied() {
    let mut harness = Harness::new();
    if let Some(staging) = harness.config.environments.get_mut(&EnvironmentName::Staging) {
        if let Some(trust) = staging.trust.as_mut() {
            trust.workflow = "deploy.yml".to_string();
        }
    }

    let runs = harness.dispatch("v1.2.0").await;

    let staging = run_for(&runs, EnvironmentName::Staging);
    assert_eq!(
        staging.failure().unwrap().kind,
        ErrorKind::AuthorizationDenied
    );
    assert!(run_for(&runs, EnvironmentName::Production).is_published());
}

#[tokio::test]
async fn test_trust_bound_to_other_environment_is_denied() {
    let mut harness = Harness::new();
    if let Some(staging) = harness.config.environments.get_mut(&EnvironmentName::Staging) {
        if let Some(trust) = staging.trust.as_mut() {
            trust.environment = "production".to_string();
        }
    }

    let runs = harness.dispatch("v1.2.0").await;

    let failure = run_for(&runs, EnvironmentName::Staging).failure().unwrap();
    assert_eq!(failure.stage, Stage::Authorize);
    assert_eq!(failure.kind, ErrorKind::AuthorizationDenied);
    assert!(run_for(&runs, EnvironmentName::Production).is_published());
    assert_eq!(harness.registry.uploads().await.len(), 1);
}
