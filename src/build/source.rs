//! Source checkout collaborators

use crate::build::{SourceProvider, SourceTree};
use crate::core::BuildError;
use crate::process::run_command;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CLONE_TIMEOUT_SECS: u64 = 600;

/// Use a tree the hosting platform already checked out
#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceProvider for WorkingTree {
    async fn checkout(&self, tag: &str, _scratch: &Path) -> Result<SourceTree, BuildError> {
        if !tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(BuildError::Checkout {
                tag: tag.to_string(),
                message: format!("{} is not a directory", self.root.display()),
            });
        }

        debug!("Using working tree {} for {}", self.root.display(), tag);
        Ok(SourceTree {
            root: self.root.clone(),
            tag: tag.to_string(),
        })
    }
}

/// Shallow clone of a repository at the tag, into the run's scratch dir
#[derive(Debug, Clone)]
pub struct GitCheckout {
    clone_url: String,
}

impl GitCheckout {
    pub fn new(clone_url: impl Into<String>) -> Self {
        Self {
            clone_url: clone_url.into(),
        }
    }
}

#[async_trait]
impl SourceProvider for GitCheckout {
    async fn checkout(&self, tag: &str, scratch: &Path) -> Result<SourceTree, BuildError> {
        let dest = scratch.join("src");
        info!("Cloning {} at {}", self.clone_url, tag);

        let argv = vec![
            "git".to_string(),
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            "--branch".to_string(),
            tag.to_string(),
            self.clone_url.clone(),
            dest.display().to_string(),
        ];

        let output = run_command(&argv, scratch, &HashMap::new(), CLONE_TIMEOUT_SECS)
            .await
            .map_err(|e| BuildError::Checkout {
                tag: tag.to_string(),
                message: e.to_string(),
            })?;

        if !output.success() {
            return Err(BuildError::Checkout {
                tag: tag.to_string(),
                message: output.diagnostics().to_string(),
            });
        }

        Ok(SourceTree {
            root: dest,
            tag: tag.to_string(),
        })
    }
}
