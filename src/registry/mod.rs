//! Registry collaborators: upload an artifact with a publish token

pub mod command;
pub mod recording;

use crate::core::{Artifact, PublishToken, RejectReason};
use async_trait::async_trait;

pub use command::CommandRegistry;
pub use recording::{RecordedUpload, RecordingRegistry};

/// Registry verdict for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// Uploads artifacts to the registry named by the token's audience
#[async_trait]
pub trait Registry: Send + Sync {
    async fn publish(&self, artifact: &Artifact, token: &PublishToken) -> PublishOutcome;
}
