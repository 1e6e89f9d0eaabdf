//! Trusted-publisher token exchange against a registry's HTTP endpoint
//!
//! `GET {endpoint}/_/oidc/audience` tells us which audience to request on
//! the assertion; `POST {endpoint}/_/oidc/mint-token` with `{"token": jwt}`
//! returns an API token scoped to the projects the trust relationship
//! covers.

use crate::core::{BrokerError, Environment, MintedToken, Secret};
use crate::identity::{IdentityAssertion, TokenIssuer};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct AudienceResponse {
    audience: String,
}

#[derive(Serialize)]
struct MintRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct MintResponse {
    token: String,
    #[serde(default)]
    expires: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MintErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<MintErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct MintErrorDetail {
    code: String,
    #[serde(default)]
    description: String,
}

/// Token issuer speaking the trusted-publisher protocol
#[derive(Debug, Clone)]
pub struct TrustedPublisherIssuer {
    client: Client,
}

impl TrustedPublisherIssuer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn endpoint(environment: &Environment, path: &str) -> String {
        format!("{}{}", environment.token_endpoint.trim_end_matches('/'), path)
    }
}

/// Map a refused mint to the broker taxonomy
fn classify_mint_failure(status: StatusCode, body: &str) -> BrokerError {
    if status.is_server_error() {
        return BrokerError::BrokerUnavailable(format!("token endpoint returned {}", status));
    }

    let parsed: Option<MintErrorBody> = serde_json::from_str(body).ok();
    let detail = parsed
        .as_ref()
        .map(|b| {
            let mut parts: Vec<String> = b
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.description))
                .collect();
            if parts.is_empty() {
                parts.extend(b.message.clone());
            }
            parts.join("; ")
        })
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("token endpoint returned {}", status));

    let codes: Vec<&str> = parsed
        .as_ref()
        .map(|b| b.errors.iter().map(|e| e.code.as_str()).collect())
        .unwrap_or_default();

    if codes
        .iter()
        .any(|c| matches!(*c, "invalid-payload" | "invalid-token" | "invalid-claims"))
    {
        BrokerError::IdentityAssertionInvalid(detail)
    } else {
        BrokerError::AuthorizationDenied(detail)
    }
}

#[async_trait]
impl TokenIssuer for TrustedPublisherIssuer {
    async fn audience(&self, environment: &Environment) -> Result<String, BrokerError> {
        if let Some(audience) = &environment.oidc_audience {
            return Ok(audience.clone());
        }

        let url = Self::endpoint(environment, "/_/oidc/audience");
        debug!("Fetching OIDC audience from {}", url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            BrokerError::BrokerUnavailable(format!("{} unreachable: {}", url, e.without_url()))
        })?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
            return Err(BrokerError::AuthorizationDenied(format!(
                "trusted publishing is not enabled at {}",
                environment.token_endpoint
            )));
        }
        if !status.is_success() {
            return Err(BrokerError::BrokerUnavailable(format!(
                "{} returned {}",
                url, status
            )));
        }

        let body: AudienceResponse = response.json().await.map_err(|e| {
            BrokerError::BrokerUnavailable(format!("unreadable audience response: {}", e.without_url()))
        })?;
        Ok(body.audience)
    }

    async fn mint_token(
        &self,
        assertion: &IdentityAssertion,
        environment: &Environment,
    ) -> Result<MintedToken, BrokerError> {
        let url = Self::endpoint(environment, "/_/oidc/mint-token");
        info!("Exchanging identity assertion at {}", url);

        let response = self
            .client
            .post(&url)
            .json(&MintRequest {
                token: assertion.raw().expose(),
            })
            .send()
            .await
            .map_err(|e| {
                BrokerError::BrokerUnavailable(format!("{} unreachable: {}", url, e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // The endpoint never echoes the assertion, but scrub it regardless
            let body = assertion.raw().scrub(&body);
            return Err(classify_mint_failure(status, &body));
        }

        let body: MintResponse = response.json().await.map_err(|e| {
            BrokerError::BrokerUnavailable(format!("unreadable mint response: {}", e.without_url()))
        })?;

        Ok(MintedToken {
            secret: Secret::new(body.token),
            expiry: body.expires.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }
}
