//! Identity assertions from the CI platform

use crate::core::{BrokerError, Environment, Secret};
use crate::identity::{IdentityAssertion, IdentityProvider};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

pub const REQUEST_URL_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";
pub const REQUEST_TOKEN_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";

#[derive(Debug, Deserialize)]
struct IdTokenResponse {
    value: String,
}

/// Requests an OIDC token from the GitHub Actions runtime
///
/// The job needs the `id-token: write` permission, which makes the runner
/// export the request URL and bearer token.
#[derive(Debug, Clone)]
pub struct GithubActionsIdentity {
    client: Client,
    request_url: Option<String>,
    request_token: Option<Secret>,
}

impl GithubActionsIdentity {
    pub fn new(client: Client, request_url: Option<String>, request_token: Option<Secret>) -> Self {
        Self {
            client,
            request_url,
            request_token,
        }
    }

    /// Read the request endpoint from the runner environment
    pub fn from_env(client: Client) -> Self {
        Self::new(
            client,
            std::env::var(REQUEST_URL_VAR).ok(),
            std::env::var(REQUEST_TOKEN_VAR).ok().map(Secret::new),
        )
    }
}

#[async_trait]
impl IdentityProvider for GithubActionsIdentity {
    async fn assertion(
        &self,
        audience: &str,
        _environment: &Environment,
    ) -> Result<IdentityAssertion, BrokerError> {
        let (url, token) = match (&self.request_url, &self.request_token) {
            (Some(url), Some(token)) => (url, token),
            _ => {
                return Err(BrokerError::IdentityAssertionInvalid(format!(
                    "{} / {} are not set; the job needs the id-token: write permission",
                    REQUEST_URL_VAR, REQUEST_TOKEN_VAR
                )))
            }
        };

        debug!("Requesting identity assertion for audience {}", audience);
        let response = self
            .client
            .get(url)
            .query(&[("audience", audience)])
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| {
                BrokerError::BrokerUnavailable(format!("identity endpoint unreachable: {}", e.without_url()))
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(BrokerError::BrokerUnavailable(format!(
                "identity endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(BrokerError::IdentityAssertionInvalid(format!(
                "identity endpoint returned {}",
                status
            )));
        }

        let body: IdTokenResponse = response.json().await.map_err(|e| {
            BrokerError::IdentityAssertionInvalid(format!("unreadable identity response: {}", e.without_url()))
        })?;

        IdentityAssertion::parse(&body.value, Utc::now())
    }
}

/// Reads a pre-issued assertion from an environment variable
#[derive(Debug, Clone)]
pub struct EnvAssertion {
    var: String,
}

impl EnvAssertion {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl IdentityProvider for EnvAssertion {
    async fn assertion(
        &self,
        _audience: &str,
        _environment: &Environment,
    ) -> Result<IdentityAssertion, BrokerError> {
        let raw = std::env::var(&self.var).map_err(|_| {
            BrokerError::IdentityAssertionInvalid(format!("{} is not set", self.var))
        })?;
        IdentityAssertion::parse(&raw, Utc::now())
    }
}
