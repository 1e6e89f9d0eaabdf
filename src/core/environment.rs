//! Deployment environments and their static resolution

use crate::core::error::ReleaseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of a deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentName {
    Staging,
    Production,
}

impl EnvironmentName {
    pub const ALL: [EnvironmentName; 2] = [EnvironmentName::Staging, EnvironmentName::Production];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentName::Staging => "staging",
            EnvironmentName::Production => "production",
        }
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository + workflow + environment tuple registered with a registry's
/// identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRelationship {
    /// `owner/name` of the source repository
    pub repository: String,
    /// Workflow file name, e.g. `release.yml`
    pub workflow: String,
    /// Deployment environment name as seen by the CI platform
    pub environment: String,
}

/// A resolved deployment target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: EnvironmentName,

    /// Upload endpoint; also the audience of every token minted for it
    pub registry_url: String,

    /// Base URL of the registry's token exchange
    pub token_endpoint: String,

    /// Audience to request on the identity assertion; fetched from the
    /// registry when absent
    pub oidc_audience: Option<String>,

    pub requires_approval: bool,

    pub credential_scope: String,

    pub trust: Option<TrustRelationship>,
}

/// Resolves environment names against the static configuration
#[derive(Debug, Clone, Default)]
pub struct EnvironmentBinder {
    environments: BTreeMap<EnvironmentName, Environment>,
}

impl EnvironmentBinder {
    pub fn new(environments: impl IntoIterator<Item = Environment>) -> Self {
        Self {
            environments: environments.into_iter().map(|e| (e.name, e)).collect(),
        }
    }

    /// Look up an environment; unconfigured names are fatal for the run
    pub fn resolve(&self, name: EnvironmentName) -> Result<Environment, ReleaseError> {
        self.environments
            .get(&name)
            .cloned()
            .ok_or_else(|| ReleaseError::EnvironmentUnconfigured(name.to_string()))
    }

    pub fn is_configured(&self, name: EnvironmentName) -> bool {
        self.environments.contains_key(&name)
    }

    pub fn environments(&self) -> impl Iterator<Item = &Environment> {
        self.environments.values()
    }
}

/// Derive the token exchange base from a registry upload URL
///
/// `https://test.pypi.org/legacy/` becomes `https://test.pypi.org`. Values
/// that are not URLs are used as-is.
pub fn default_token_endpoint(registry_url: &str) -> String {
    match reqwest::Url::parse(registry_url) {
        Ok(url) if url.has_host() => url.origin().ascii_serialization(),
        _ => registry_url.trim_end_matches('/').to_string(),
    }
}
