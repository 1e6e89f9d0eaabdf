//! Release configuration from YAML

use crate::core::environment::{
    default_token_endpoint, Environment, EnvironmentBinder, EnvironmentName, TrustRelationship,
};
use crate::core::trigger::{PipelineDefinition, TagPattern, TriggerMatcher, DEFAULT_TAG_PATTERN};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// File name looked up when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "release.yaml";

/// Top-level release configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Package name, used in operator output
    pub name: String,

    pub build: BuildConfig,

    pub publish: PublishConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    /// Deployment environments keyed by name
    #[serde(default)]
    pub environments: BTreeMap<EnvironmentName, EnvironmentConfig>,

    /// Pipeline variants; `publish-staging` and `publish-production` when omitted
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

/// Source checkout, setup and build commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Working tree to build from
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Clone this repository at the tag instead of using `source_dir`
    #[serde(default)]
    pub clone_url: Option<String>,

    /// Toolchain setup and dependency install commands, run in order
    #[serde(default)]
    pub setup: Vec<Vec<String>>,

    /// Build command; must write artifacts to `{{ out_dir }}`
    pub command: Vec<String>,

    /// Extra environment for setup and build commands
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Timeout per command (in seconds)
    #[serde(default = "default_build_timeout")]
    pub timeout_secs: u64,

    /// Root for per-run scratch directories
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

/// Upload command and publish policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Upload command, run once per artifact with `{{ artifact }}` and
    /// `{{ registry_url }}` available
    pub command: Vec<String>,

    /// Variable through which the upload command receives the token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Print each artifact's sha256 before uploading
    #[serde(default = "default_true")]
    pub verify_hashes: bool,

    /// Treat "already exists" rejections as non-fatal
    #[serde(default)]
    pub skip_existing: bool,

    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

/// Where the workload identity assertion comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub provider: IdentityProviderKind,

    /// Variable holding a pre-issued assertion (provider `env`)
    #[serde(default = "default_assertion_env")]
    pub assertion_env: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            provider: IdentityProviderKind::default(),
            assertion_env: default_assertion_env(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityProviderKind {
    /// GitHub Actions OIDC token request
    #[default]
    GithubActions,
    /// Assertion read from an environment variable
    Env,
}

/// Environment configuration as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub registry_url: String,

    #[serde(default)]
    pub token_endpoint: Option<String>,

    #[serde(default)]
    pub oidc_audience: Option<String>,

    #[serde(default)]
    pub requires_approval: bool,

    pub credential_scope: String,

    #[serde(default)]
    pub trust: Option<TrustRelationship>,
}

/// A pipeline variant as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,

    pub environment: EnvironmentName,

    #[serde(default = "default_tag_pattern")]
    pub tag_pattern: String,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_build_timeout() -> u64 {
    1800
}

fn default_publish_timeout() -> u64 {
    300
}

fn default_token_env() -> String {
    "TWINE_PASSWORD".to_string()
}

fn default_assertion_env() -> String {
    "TAGSHIP_ID_TOKEN".to_string()
}

fn default_tag_pattern() -> String {
    DEFAULT_TAG_PATTERN.to_string()
}

fn default_true() -> bool {
    true
}

impl ReleaseConfig {
    /// Load release configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse release configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ReleaseConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Find the release file: explicit path, working directory, then the
    /// user config directory
    pub fn discover(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }

        if let Some(dir) = dirs::config_dir() {
            let user = dir.join("tagship").join(DEFAULT_CONFIG_FILE);
            if user.exists() {
                return Ok(user);
            }
        }

        anyhow::bail!(
            "No {} found in the working directory; pass --config",
            DEFAULT_CONFIG_FILE
        )
    }

    /// Validate the release configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Release name cannot be empty");
        }

        if self.build.command.is_empty() {
            anyhow::bail!("build.command cannot be empty");
        }
        for (i, step) in self.build.setup.iter().enumerate() {
            if step.is_empty() {
                anyhow::bail!("build.setup[{}] cannot be empty", i);
            }
        }

        if self.publish.command.is_empty() {
            anyhow::bail!("publish.command cannot be empty");
        }
        if self.publish.token_env.trim().is_empty() {
            anyhow::bail!("publish.token_env cannot be empty");
        }

        for (name, env) in &self.environments {
            if env.registry_url.trim().is_empty() {
                anyhow::bail!("Environment '{}' has no registry_url", name);
            }
            if env.credential_scope.trim().is_empty() {
                anyhow::bail!("Environment '{}' has no credential_scope", name);
            }
        }

        let mut seen = HashSet::new();
        for pipeline in &self.pipelines {
            if !seen.insert(&pipeline.name) {
                anyhow::bail!("Duplicate pipeline name: {}", pipeline.name);
            }
            TagPattern::new(&pipeline.tag_pattern).with_context(|| {
                format!(
                    "Pipeline '{}' has an invalid tag_pattern '{}'",
                    pipeline.name, pipeline.tag_pattern
                )
            })?;
        }

        Ok(())
    }

    /// Pipelines that name an environment with no configuration
    ///
    /// Not a load error: such runs fail at environment binding.
    pub fn unconfigured_pipelines(&self) -> Result<Vec<PipelineDefinition>> {
        Ok(self
            .pipeline_definitions()?
            .into_iter()
            .filter(|p| !self.environments.contains_key(&p.environment))
            .collect())
    }

    /// Pipeline definitions, defaulting to one `publish-<env>` per
    /// environment whether configured or not
    pub fn pipeline_definitions(&self) -> Result<Vec<PipelineDefinition>> {
        if self.pipelines.is_empty() {
            return EnvironmentName::ALL
                .iter()
                .map(|name| {
                    Ok(PipelineDefinition {
                        name: format!("publish-{}", name),
                        environment: *name,
                        pattern: TagPattern::new(DEFAULT_TAG_PATTERN)?,
                    })
                })
                .collect();
        }

        self.pipelines
            .iter()
            .map(|p| {
                Ok(PipelineDefinition {
                    name: p.name.clone(),
                    environment: p.environment,
                    pattern: TagPattern::new(&p.tag_pattern)?,
                })
            })
            .collect()
    }

    pub fn trigger_matcher(&self) -> Result<TriggerMatcher> {
        Ok(TriggerMatcher::new(self.pipeline_definitions()?))
    }

    /// Resolved environments
    pub fn environments(&self) -> Vec<Environment> {
        self.environments
            .iter()
            .map(|(name, env)| Environment {
                name: *name,
                registry_url: env.registry_url.clone(),
                token_endpoint: env
                    .token_endpoint
                    .clone()
                    .unwrap_or_else(|| default_token_endpoint(&env.registry_url)),
                oidc_audience: env.oidc_audience.clone(),
                requires_approval: env.requires_approval,
                credential_scope: env.credential_scope.clone(),
                trust: env.trust.clone(),
            })
            .collect()
    }

    pub fn environment_binder(&self) -> EnvironmentBinder {
        EnvironmentBinder::new(self.environments())
    }

    /// Scratch root for run directories
    pub fn scratch_root(&self) -> PathBuf {
        self.build
            .scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("tagship"))
    }
}
