//! Workload identity and the registry token exchange
//!
//! A run proves who it is with a signed identity assertion (an OIDC JWT
//! issued by the CI platform) and trades it for a publish token at the
//! registry. No long-lived secret is read or stored anywhere in this flow.

pub mod github;
pub mod local;
pub mod trusted_publisher;

use crate::core::{BrokerError, Environment, MintedToken, Secret};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub use github::{EnvAssertion, GithubActionsIdentity};
pub use local::{LocalTrustIssuer, StaticIdentity};
pub use trusted_publisher::TrustedPublisherIssuer;

/// Claims this crate reads from an identity assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// `owner/name` of the repository
    pub repository: String,

    /// `owner/name/.github/workflows/<file>@<ref>`
    #[serde(default)]
    pub job_workflow_ref: Option<String>,

    #[serde(default)]
    pub workflow_ref: Option<String>,

    #[serde(default)]
    pub run_id: Option<String>,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub aud: Option<String>,

    pub exp: i64,

    #[serde(default)]
    pub iat: Option<i64>,
}

impl IdentityClaims {
    /// Workflow file name, e.g. `release.yml`
    pub fn workflow_file(&self) -> Option<&str> {
        let reference = self
            .job_workflow_ref
            .as_deref()
            .or(self.workflow_ref.as_deref())?;
        let path = reference.split('@').next().unwrap_or(reference);
        path.rsplit('/').next()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// A signed statement of who the running workload is
#[derive(Debug, Clone)]
pub struct IdentityAssertion {
    raw: Secret,
    claims: IdentityClaims,
}

impl IdentityAssertion {
    /// Decode a compact JWT and check it has not expired at `now`
    ///
    /// The signature is not verified here; the registry does that.
    pub fn parse(raw: &str, now: DateTime<Utc>) -> Result<Self, BrokerError> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(BrokerError::IdentityAssertionInvalid(
                "assertion is not a three-part JWT".to_string(),
            ));
        }

        let payload = URL_SAFE_NO_PAD
            .decode(parts[1].trim_end_matches('='))
            .map_err(|e| {
                BrokerError::IdentityAssertionInvalid(format!("payload is not base64url: {}", e))
            })?;

        let claims: IdentityClaims = serde_json::from_slice(&payload).map_err(|e| {
            BrokerError::IdentityAssertionInvalid(format!("unreadable claims: {}", e))
        })?;

        let assertion = Self {
            raw: Secret::new(raw),
            claims,
        };
        assertion.check_fresh(now)?;
        Ok(assertion)
    }

    pub fn check_fresh(&self, now: DateTime<Utc>) -> Result<(), BrokerError> {
        match self.claims.expires_at() {
            Some(exp) if exp > now => Ok(()),
            Some(exp) => Err(BrokerError::IdentityAssertionInvalid(format!(
                "assertion expired at {}",
                exp.to_rfc3339()
            ))),
            None => Err(BrokerError::IdentityAssertionInvalid(
                "assertion has an invalid exp claim".to_string(),
            )),
        }
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    pub fn raw(&self) -> &Secret {
        &self.raw
    }
}

/// Supplies the ambient workload identity of the running pipeline
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch an assertion for `audience` on behalf of a run bound to
    /// `environment`
    async fn assertion(
        &self,
        audience: &str,
        environment: &Environment,
    ) -> Result<IdentityAssertion, BrokerError>;
}

/// The registry side of the exchange
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Audience the assertion must be issued for
    async fn audience(&self, environment: &Environment) -> Result<String, BrokerError>;

    /// Trade an assertion for a short-lived token scoped to the environment's
    /// registry
    async fn mint_token(
        &self,
        assertion: &IdentityAssertion,
        environment: &Environment,
    ) -> Result<MintedToken, BrokerError>;
}

/// Encode claims as an unsigned compact JWT
pub fn encode_unsigned(claims: &IdentityClaims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = serde_json::to_vec(claims).unwrap_or_default();
    format!("{}.{}.unsigned", header, URL_SAFE_NO_PAD.encode(payload))
}
