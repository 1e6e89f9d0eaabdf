//! tagship - build and publish a package when a release tag is pushed

pub mod build;
pub mod cli;
pub mod core;
pub mod execution;
pub mod identity;
pub mod process;
pub mod registry;

// Re-export commonly used types
pub use crate::core::{
    Artifact, Environment, EnvironmentBinder, EnvironmentName, ErrorKind, PipelineRun, RefEvent,
    ReleaseError, RunState, Stage, TriggerMatcher,
};
pub use build::{Builder, CommandBuilder, GitCheckout, SourceProvider, SourceTree, WorkingTree};
pub use execution::{
    ApprovalDecision, ApprovalGate, CancellationFlag, Collaborators, CredentialBroker, Dispatcher,
    EngineSettings, EventKind, ReleaseEngine, ReleaseEvent,
};
pub use identity::{IdentityAssertion, IdentityProvider, TokenIssuer};
pub use registry::{PublishOutcome, Registry};
