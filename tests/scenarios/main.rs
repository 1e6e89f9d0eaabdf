//! Scenario-based tests for tagship

mod helpers;

mod aborted_runs;
mod approval_gate;
mod broker_failures;
mod build_failures;
mod publish_success;
mod rerun;
mod trigger_matching;
