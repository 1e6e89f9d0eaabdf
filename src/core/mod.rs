//! Core domain models for release runs
//!
//! This module defines the data structures the pipeline moves through:
//! trigger events, environments, artifacts, tokens and the run state machine.

pub mod artifact;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod run;
pub mod state;
pub mod token;
pub mod trigger;

pub use artifact::*;
pub use context::*;
pub use environment::*;
pub use error::*;
pub use run::*;
pub use state::*;
pub use token::*;
pub use trigger::*;
