//! In-memory registry for dry runs and tests

use crate::core::{Artifact, PublishToken, RejectReason};
use crate::registry::{PublishOutcome, Registry};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::info;

/// An accepted upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub registry: String,
    pub file_name: String,
    pub content_hash: String,
}

/// Accepts each (registry, file name) once and rejects re-uploads, like an
/// append-only package index
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    published: Mutex<HashSet<(String, String)>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    attempts: Mutex<usize>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepted uploads, in order
    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().await.clone()
    }

    /// Upload attempts, accepted or not
    pub async fn attempts(&self) -> usize {
        *self.attempts.lock().await
    }
}

#[async_trait]
impl Registry for RecordingRegistry {
    async fn publish(&self, artifact: &Artifact, token: &PublishToken) -> PublishOutcome {
        *self.attempts.lock().await += 1;

        if token.is_expired_at(Utc::now()) {
            return PublishOutcome::Rejected(RejectReason::TokenExpired);
        }

        let key = (token.audience().to_string(), artifact.file_name());
        let mut published = self.published.lock().await;
        if !published.insert(key) {
            return PublishOutcome::Rejected(RejectReason::AlreadyExists);
        }

        info!("Recorded {} on {}", artifact.file_name(), token.audience());
        self.uploads.lock().await.push(RecordedUpload {
            registry: token.audience().to_string(),
            file_name: artifact.file_name(),
            content_hash: artifact.content_hash.clone(),
        });
        PublishOutcome::Accepted
    }
}
