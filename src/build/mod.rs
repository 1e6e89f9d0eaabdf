//! Build collaborators: fetch source at a ref and turn it into artifacts

pub mod command;
pub mod source;

use crate::core::{Artifact, BuildError, RunContext};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use command::CommandBuilder;
pub use source::{GitCheckout, WorkingTree};

/// A source tree checked out at the triggering ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub root: PathBuf,
    pub tag: String,
}

/// Fetches source at a ref
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Check out `tag`; `scratch` is the run's private directory
    async fn checkout(&self, tag: &str, scratch: &Path) -> Result<SourceTree, BuildError>;
}

/// Produces distributable artifacts from a source tree
#[async_trait]
pub trait Builder: Send + Sync {
    /// Build into `out_dir`; an empty result is an error
    async fn build(
        &self,
        source: &SourceTree,
        out_dir: &Path,
        context: &RunContext,
    ) -> Result<Vec<Artifact>, BuildError>;
}
