//! Registry collaborator that shells out to an upload tool

use crate::core::config::PublishConfig;
use crate::core::{Artifact, PublishToken, RejectReason, RunContext};
use crate::process::{run_command, ProcessError};
use crate::registry::{PublishOutcome, Registry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Runs the configured upload command once per artifact
///
/// The token reaches the command only through `token_env`, never through
/// argv, and is scrubbed from any output quoted in a rejection.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    command: Vec<String>,
    token_env: String,
    env: HashMap<String, String>,
    timeout_secs: u64,
    cwd: PathBuf,
}

impl CommandRegistry {
    pub fn new(command: Vec<String>, token_env: impl Into<String>) -> Self {
        Self {
            command,
            token_env: token_env.into(),
            env: HashMap::new(),
            timeout_secs: 300,
            cwd: PathBuf::from("."),
        }
    }

    pub fn from_config(config: &PublishConfig) -> Self {
        Self {
            command: config.command.clone(),
            token_env: config.token_env.clone(),
            env: config.env.clone(),
            timeout_secs: config.timeout_secs,
            cwd: PathBuf::from("."),
        }
    }
}

/// Map upload tool output to a rejection reason
pub fn classify_rejection(output: &str) -> RejectReason {
    let lower = output.to_lowercase();
    if lower.contains("already exists") || lower.contains("file exists") {
        RejectReason::AlreadyExists
    } else if lower.contains("403")
        || lower.contains("invalid or non-existent authentication")
        || lower.contains("invalid api token")
    {
        RejectReason::InvalidToken
    } else {
        let line = output.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("upload failed");
        RejectReason::Other(line.trim().to_string())
    }
}

#[async_trait]
impl Registry for CommandRegistry {
    async fn publish(&self, artifact: &Artifact, token: &PublishToken) -> PublishOutcome {
        let mut context = RunContext::new();
        context.set_variable("registry_url", token.audience());
        context.set_path("artifact", &artifact.path);
        let argv = context.render_args(&self.command);

        let mut envs = self.env.clone();
        envs.insert(self.token_env.clone(), token.secret().expose().to_string());

        debug!("Uploading {} to {}", artifact.file_name(), token.audience());
        let output = match run_command(&argv, &self.cwd, &envs, self.timeout_secs).await {
            Ok(output) => output,
            Err(ProcessError::Timeout(secs)) => {
                return PublishOutcome::Rejected(RejectReason::Other(format!(
                    "upload timed out after {} seconds",
                    secs
                )))
            }
            Err(e) => return PublishOutcome::Rejected(RejectReason::Other(e.to_string())),
        };

        if output.success() {
            return PublishOutcome::Accepted;
        }

        let combined = token
            .secret()
            .scrub(&format!("{}\n{}", output.stdout, output.stderr));
        warn!(
            "Upload of {} exited with code {}",
            artifact.file_name(),
            output.code
        );
        PublishOutcome::Rejected(classify_rejection(&combined))
    }
}
