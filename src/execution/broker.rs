//! Credential broker: identity assertion in, publish token out

use crate::core::{BrokerError, Environment, PipelineRun, PublishToken};
use crate::identity::{IdentityProvider, TokenIssuer};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Exchanges the workflow identity for a token bound to one environment
///
/// Holds no long-lived secret. Each run may mint at most one token; a
/// second request for the same run is refused.
#[derive(Clone)]
pub struct CredentialBroker {
    identity: Arc<dyn IdentityProvider>,
    issuer: Arc<dyn TokenIssuer>,
}

impl CredentialBroker {
    pub fn new(identity: Arc<dyn IdentityProvider>, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self { identity, issuer }
    }

    pub async fn authorize(
        &self,
        run: &mut PipelineRun,
        environment: &Environment,
    ) -> Result<PublishToken, BrokerError> {
        if !run.claim_token_mint() {
            return Err(BrokerError::AuthorizationDenied(format!(
                "run {} already requested a token",
                run.run_id
            )));
        }

        let audience = self.issuer.audience(environment).await?;
        debug!("Requesting identity assertion for audience {}", audience);

        let assertion = self.identity.assertion(&audience, environment).await?;
        assertion.check_fresh(Utc::now())?;

        let minted = self.issuer.mint_token(&assertion, environment).await?;
        let token = PublishToken::bind(environment, minted);
        info!(
            "Authorized run {} for {} until {}",
            run.run_id,
            token.audience(),
            token.expiry()
        );
        Ok(token)
    }
}
