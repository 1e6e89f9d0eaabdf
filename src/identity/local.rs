//! In-process identity and token exchange for dry runs

use crate::core::{BrokerError, Environment, MintedToken, Secret};
use crate::identity::{encode_unsigned, IdentityAssertion, IdentityClaims, IdentityProvider, TokenIssuer};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use uuid::Uuid;

/// Issues unsigned assertions for a fixed repository and workflow
///
/// The `environment` claim is the one set with `with_environment` (or
/// `GITHUB_ENVIRONMENT`), else the name of the run's environment.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    repository: String,
    workflow: String,
    environment: Option<String>,
    run_id: String,
    lifetime: Duration,
}

impl StaticIdentity {
    pub fn new(repository: impl Into<String>, workflow: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            workflow: workflow.into(),
            environment: None,
            run_id: "local".to_string(),
            lifetime: Duration::minutes(5),
        }
    }

    /// Identity from `GITHUB_REPOSITORY` / `GITHUB_WORKFLOW_REF` /
    /// `GITHUB_RUN_ID` / `GITHUB_ENVIRONMENT`
    pub fn from_github_env() -> Option<Self> {
        let repository = std::env::var("GITHUB_REPOSITORY").ok()?;
        let workflow_ref = std::env::var("GITHUB_WORKFLOW_REF").ok()?;
        let workflow = workflow_ref
            .split('@')
            .next()
            .and_then(|p| p.rsplit('/').next())
            .unwrap_or_default()
            .to_string();
        let mut identity = Self::new(repository, workflow);
        if let Ok(run_id) = std::env::var("GITHUB_RUN_ID") {
            identity.run_id = run_id;
        }
        if let Ok(environment) = std::env::var("GITHUB_ENVIRONMENT") {
            identity = identity.with_environment(environment);
        }
        Some(identity)
    }

    /// Claim a fixed deployment environment for every run
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Lifetime of issued assertions; a negative value issues expired ones
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn assertion(
        &self,
        audience: &str,
        environment: &Environment,
    ) -> Result<IdentityAssertion, BrokerError> {
        let now = Utc::now();
        let claims = IdentityClaims {
            repository: self.repository.clone(),
            job_workflow_ref: Some(format!(
                "{}/.github/workflows/{}@refs/heads/local",
                self.repository, self.workflow
            )),
            workflow_ref: None,
            run_id: Some(self.run_id.clone()),
            environment: Some(
                self.environment
                    .clone()
                    .unwrap_or_else(|| environment.name.to_string()),
            ),
            aud: Some(audience.to_string()),
            exp: (now + self.lifetime).timestamp(),
            iat: Some(now.timestamp()),
        };
        IdentityAssertion::parse(&encode_unsigned(&claims), now)
    }
}

/// Token issuer that checks assertions against each environment's
/// configured trust relationship
#[derive(Debug, Default)]
pub struct LocalTrustIssuer {
    minted: AtomicUsize,
}

impl LocalTrustIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens issued so far
    pub fn minted(&self) -> usize {
        self.minted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for LocalTrustIssuer {
    async fn audience(&self, environment: &Environment) -> Result<String, BrokerError> {
        Ok(environment
            .oidc_audience
            .clone()
            .unwrap_or_else(|| environment.registry_url.clone()))
    }

    async fn mint_token(
        &self,
        assertion: &IdentityAssertion,
        environment: &Environment,
    ) -> Result<MintedToken, BrokerError> {
        assertion.check_fresh(Utc::now())?;

        let trust = environment.trust.as_ref().ok_or_else(|| {
            BrokerError::AuthorizationDenied(format!(
                "no trust relationship registered for environment '{}'",
                environment.name
            ))
        })?;

        let claims = assertion.claims();
        let workflow = claims.workflow_file().unwrap_or_default();
        let claimed_env = claims.environment.as_deref().unwrap_or_default();

        if claims.repository != trust.repository
            || workflow != trust.workflow
            || claimed_env != trust.environment
        {
            return Err(BrokerError::AuthorizationDenied(format!(
                "no trust relationship for {} / {} / {}",
                claims.repository, workflow, claimed_env
            )));
        }

        self.minted.fetch_add(1, Ordering::SeqCst);
        debug!("Minted local token for {}", environment.name);
        Ok(MintedToken {
            secret: Secret::new(format!("local-{}", Uuid::new_v4())),
            expiry: Some(Utc::now() + Duration::minutes(15)),
        })
    }
}
