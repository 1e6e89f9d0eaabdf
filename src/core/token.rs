//! Short-lived publish credentials

use crate::core::environment::Environment;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Lifetime assumed when the token endpoint does not report one
pub const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 15;

/// A credential value that never prints
///
/// No `Display`, no `Serialize`; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw value for the one place that must send it
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replace every occurrence of the secret in `text`
    pub fn scrub(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_string();
        }
        text.replace(&self.0, "***")
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Raw result of a token exchange, before it is bound to an environment
#[derive(Debug)]
pub struct MintedToken {
    pub secret: Secret,
    pub expiry: Option<DateTime<Utc>>,
}

/// Token authorizing uploads to exactly one registry for one run
///
/// Not `Clone`: the publish stage takes it by value and it is dropped with
/// the run.
#[derive(Debug)]
pub struct PublishToken {
    audience: String,
    expiry: DateTime<Utc>,
    scope: String,
    secret: Secret,
}

impl PublishToken {
    /// Bind a minted token to the environment that requested it; the
    /// audience is always the environment's registry URL
    pub fn bind(environment: &Environment, minted: MintedToken) -> Self {
        let expiry = minted
            .expiry
            .unwrap_or_else(|| Utc::now() + Duration::minutes(DEFAULT_TOKEN_LIFETIME_MINUTES));
        Self {
            audience: environment.registry_url.clone(),
            expiry,
            scope: environment.credential_scope.clone(),
            secret: minted.secret,
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}
