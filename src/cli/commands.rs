//! CLI command definitions

use crate::core::EnvironmentName;
use clap::Args;
use std::path::PathBuf;

/// Run every pipeline the ref triggers
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Ref that was created, e.g. `refs/tags/v1.2.0`; defaults to `GITHUB_REF`
    #[arg(long = "ref")]
    pub reference: Option<String>,

    /// Only start runs for this environment
    #[arg(short, long, value_enum)]
    pub environment: Option<EnvironmentArg>,

    /// Approve every protected environment without prompting
    #[arg(long, conflicts_with = "deny")]
    pub approve: bool,

    /// Deny every protected environment without prompting
    #[arg(long)]
    pub deny: bool,

    /// Give up waiting for approval after this many seconds
    #[arg(long)]
    pub approval_timeout: Option<u64>,

    /// Use the local trust registry and an in-memory package registry
    #[arg(long)]
    pub dry_run: bool,

    /// Keep each run's scratch directory
    #[arg(long)]
    pub keep_scratch: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Show which pipelines a ref would start
#[derive(Debug, Args, Clone)]
pub struct MatchCommand {
    /// Ref to test, e.g. `v1.2.0` or `refs/tags/v1.2.0`
    pub reference: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate the release configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print artifact hashes
#[derive(Debug, Args, Clone)]
pub struct HashCommand {
    /// Directory holding built artifacts
    pub dir: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Environment argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EnvironmentArg {
    Staging,
    Production,
}

impl From<EnvironmentArg> for EnvironmentName {
    fn from(arg: EnvironmentArg) -> Self {
        match arg {
            EnvironmentArg::Staging => EnvironmentName::Staging,
            EnvironmentArg::Production => EnvironmentName::Production,
        }
    }
}
