//! Subprocess execution shared by the build and upload collaborators

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Failure to get an exit status out of a command
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty command")]
    Empty,

    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; -1 when killed by a signal
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stderr, falling back to stdout when stderr is empty
    pub fn diagnostics(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Run `argv` in `cwd` with extra environment, killing it on timeout
pub async fn run_command(
    argv: &[String],
    cwd: &Path,
    envs: &HashMap<String, String>,
    timeout_secs: u64,
) -> Result<CommandOutput, ProcessError> {
    let (program, args) = argv.split_first().ok_or(ProcessError::Empty)?;
    debug!("Running {} with {} args in {}", program, args.len(), cwd.display());

    let result = timeout(
        Duration::from_secs(timeout_secs),
        Command::new(program)
            .args(args)
            .current_dir(cwd)
            .envs(envs)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| ProcessError::Timeout(timeout_secs))?;

    let output = result.map_err(|e| ProcessError::Spawn {
        program: program.clone(),
        message: e.to_string(),
    })?;

    Ok(CommandOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
