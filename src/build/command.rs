//! Build collaborator that shells out to the project's toolchain

use crate::build::{Builder, SourceTree};
use crate::core::config::BuildConfig;
use crate::core::{collect_artifacts, Artifact, BuildError, RunContext};
use crate::process::{run_command, ProcessError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Runs setup commands, then the build command, then collects artifacts
/// from the output directory
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    setup: Vec<Vec<String>>,
    command: Vec<String>,
    env: HashMap<String, String>,
    timeout_secs: u64,
}

impl CommandBuilder {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            setup: Vec::new(),
            command,
            env: HashMap::new(),
            timeout_secs: 1800,
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            setup: config.setup.clone(),
            command: config.command.clone(),
            env: config.env.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn with_setup(mut self, step: Vec<String>) -> Self {
        self.setup.push(step);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    async fn run_step(
        &self,
        step: &str,
        argv: &[String],
        cwd: &Path,
        context: &RunContext,
    ) -> Result<(), BuildError> {
        let rendered = context.render_args(argv);
        debug!("{}: {:?}", step, rendered);

        let output = run_command(&rendered, cwd, &self.env, self.timeout_secs)
            .await
            .map_err(|e| match e {
                ProcessError::Timeout(secs) => BuildError::Timeout {
                    step: step.to_string(),
                    secs,
                },
                other => BuildError::Spawn {
                    step: step.to_string(),
                    message: other.to_string(),
                },
            })?;

        if !output.success() {
            warn!("{} exited with code {}", step, output.code);
            return Err(BuildError::CommandFailed {
                step: step.to_string(),
                code: output.code,
                stderr: output.diagnostics().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Builder for CommandBuilder {
    async fn build(
        &self,
        source: &SourceTree,
        out_dir: &Path,
        context: &RunContext,
    ) -> Result<Vec<Artifact>, BuildError> {
        tokio::fs::create_dir_all(out_dir).await?;

        let mut context = context.clone();
        context.set_path("out_dir", out_dir);
        context.set_path("source_dir", &source.root);

        for (i, step) in self.setup.iter().enumerate() {
            self.run_step(&format!("setup step {}", i + 1), step, &source.root, &context)
                .await?;
        }

        info!("Building {} in {}", source.tag, source.root.display());
        self.run_step("build command", &self.command, &source.root, &context)
            .await?;

        let artifacts = collect_artifacts(out_dir).await?;
        if artifacts.is_empty() {
            return Err(BuildError::NoArtifacts(out_dir.display().to_string()));
        }
        Ok(artifacts)
    }
}
