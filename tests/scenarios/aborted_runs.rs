//! Test: a run whose task dies is still reported

use crate::helpers::*;
use std::sync::Arc;
use tagship::core::{EnvironmentName, ErrorKind, RefEvent, RunState, Stage};
use tagship::execution::{Dispatcher, EventKind};

#[tokio::test]
async fn test_panicked_run_comes_back_failed() {
    let harness = Harness::new();
    let engine = harness.engine().with_event_handler(|event| {
        if event.environment == EnvironmentName::Production
            && matches!(event.kind, EventKind::RunStarted { .. })
        {
            panic!("console handler crashed");
        }
    });
    let dispatcher = Dispatcher::new(harness.config.trigger_matcher().unwrap(), Arc::new(engine));

    let runs = dispatcher.dispatch(&RefEvent::parse("v1.2.0")).await;

    assert_eq!(runs.len(), 2);
    assert!(run_for(&runs, EnvironmentName::Staging).is_published());

    let production = run_for(&runs, EnvironmentName::Production);
    assert!(production.has_failed());
    let failure = production.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Internal);
    assert_eq!(failure.stage, Stage::Environment);
    assert_eq!(failure.from, RunState::Matched);
    assert!(failure.message.contains("without a result"));
}
