//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HashCommand, MatchCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Tag-triggered package release tool
#[derive(Debug, Parser, Clone)]
#[command(name = "tagship")]
#[command(version)]
#[command(about = "Build and publish a package when a release tag is pushed", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the release configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run every pipeline the ref triggers
    Run(RunCommand),

    /// Show which pipelines a ref would start
    Match(MatchCommand),

    /// Validate the release configuration
    Validate(ValidateCommand),

    /// Print the sha256 of every artifact in a directory
    Hash(HashCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
