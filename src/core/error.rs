//! Error taxonomy for release runs

use crate::core::state::{RunState, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a run failure, surfaced verbatim to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    TriggerMismatch,
    EnvironmentUnconfigured,
    ApprovalTimeout,
    ApprovalDenied,
    BuildError,
    AuthorizationDenied,
    IdentityAssertionInvalid,
    BrokerUnavailable,
    PublishRejected,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Errors raised by the build collaborators
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("checkout of '{tag}' failed: {message}")]
    Checkout { tag: String, message: String },

    #[error("{step} exited with code {code}: {stderr}")]
    CommandFailed {
        step: String,
        code: i32,
        stderr: String,
    },

    #[error("{step} timed out after {secs} seconds")]
    Timeout { step: String, secs: u64 },

    #[error("failed to spawn {step}: {message}")]
    Spawn { step: String, message: String },

    #[error("build produced no artifacts in {0}")]
    NoArtifacts(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors raised while exchanging workload identity for a publish token
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("identity assertion invalid: {0}")]
    IdentityAssertionInvalid(String),

    #[error("token broker unavailable: {0}")]
    BrokerUnavailable(String),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
            BrokerError::IdentityAssertionInvalid(_) => ErrorKind::IdentityAssertionInvalid,
            BrokerError::BrokerUnavailable(_) => ErrorKind::BrokerUnavailable,
        }
    }
}

/// Reason a registry refused an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The version/file is already published
    AlreadyExists,
    /// The registry did not accept the token
    InvalidToken,
    /// Token audience differs from the run's registry
    AudienceMismatch,
    /// Token lifetime is over
    TokenExpired,
    Other(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::AlreadyExists => write!(f, "file already exists"),
            RejectReason::InvalidToken => write!(f, "token rejected by registry"),
            RejectReason::AudienceMismatch => write!(f, "token audience does not match registry"),
            RejectReason::TokenExpired => write!(f, "token expired"),
            RejectReason::Other(message) => write!(f, "{}", message),
        }
    }
}

/// Illegal state machine transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: RunState,
    pub to: RunState,
}

/// Any error that ends a release run
#[derive(Debug, Clone, Error)]
pub enum ReleaseError {
    #[error("ref '{0}' does not match any release trigger")]
    TriggerMismatch(String),

    #[error("environment '{0}' is not configured")]
    EnvironmentUnconfigured(String),

    #[error("approval for environment '{environment}' timed out after {secs} seconds")]
    ApprovalTimeout { environment: String, secs: u64 },

    #[error("approval denied for environment '{environment}': {reason}")]
    ApprovalDenied { environment: String, reason: String },

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("publish of {artifact} rejected: {reason}")]
    PublishRejected { artifact: String, reason: RejectReason },

    #[error("run cancelled before {0} stage")]
    Cancelled(Stage),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("run task ended without a result: {0}")]
    Aborted(String),
}

impl ReleaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReleaseError::TriggerMismatch(_) => ErrorKind::TriggerMismatch,
            ReleaseError::EnvironmentUnconfigured(_) => ErrorKind::EnvironmentUnconfigured,
            ReleaseError::ApprovalTimeout { .. } => ErrorKind::ApprovalTimeout,
            ReleaseError::ApprovalDenied { .. } => ErrorKind::ApprovalDenied,
            ReleaseError::Build(_) => ErrorKind::BuildError,
            ReleaseError::Broker(err) => err.kind(),
            ReleaseError::PublishRejected { .. } => ErrorKind::PublishRejected,
            ReleaseError::Cancelled(_) => ErrorKind::Cancelled,
            ReleaseError::Transition(_) | ReleaseError::Aborted(_) => ErrorKind::Internal,
        }
    }
}
