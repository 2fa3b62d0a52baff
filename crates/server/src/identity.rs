//! Identity providers: who a bearer token belongs to, and admin operations on
//! the identity store.
//!
//! Identities are issued by an external GoTrue-compatible auth service. The
//! server either asks that service about each token (`HostedIdentity`) or
//! verifies tokens locally with the service's signing secret
//! (`LocalJwtIdentity`).

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use taskdeck_api::crypto;

use crate::config::AuthMode;

/// The verified owner of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("auth service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("auth service returned {0}")]
    Upstream(reqwest::StatusCode),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to an identity.
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;

    /// Email address on record for a user, if the provider knows it.
    async fn lookup_email(&self, user_id: &str) -> Result<Option<String>, IdentityError>;

    /// Remove the identity itself. Called after the user's data is cleaned up.
    async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError>;
}

/// Build the provider selected by configuration.
pub fn from_config(mode: &AuthMode) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    let provider: Arc<dyn IdentityProvider> = match mode {
        AuthMode::Hosted { url, service_key } => {
            Arc::new(HostedIdentity::new(url.clone(), service_key.clone())?)
        }
        AuthMode::LocalJwt { secret } => Arc::new(LocalJwtIdentity::new(secret.clone())),
    };
    Ok(provider)
}

// ---------------------------------------------------------------------------
// Local verification
// ---------------------------------------------------------------------------

/// Verifies HS256 tokens with the auth service's shared secret. Has no admin
/// access, so deletions only remove local data.
pub struct LocalJwtIdentity {
    secret: String,
}

impl LocalJwtIdentity {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl IdentityProvider for LocalJwtIdentity {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims =
            crypto::verify_jwt(token, &self.secret, now).map_err(|_| IdentityError::InvalidToken)?;
        Ok(Identity {
            user_id: claims.sub,
            email: claims.email,
        })
    }

    async fn lookup_email(&self, _user_id: &str) -> Result<Option<String>, IdentityError> {
        Ok(None)
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError> {
        tracing::info!("identity {user_id} is managed by the token issuer; only local data removed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hosted auth service
// ---------------------------------------------------------------------------

/// Talks to `{url}/auth/v1/...` with the service-role key.
pub struct HostedIdentity {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct AuthUserBody {
    id: String,
    email: Option<String>,
}

impl HostedIdentity {
    pub fn new(base_url: String, service_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }

    fn admin(&self, method: reqwest::Method, user_id: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/auth/v1/admin/users/{user_id}", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

#[async_trait]
impl IdentityProvider for HostedIdentity {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let resp = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => {
                let body: AuthUserBody = resp.json().await?;
                Ok(Identity {
                    user_id: body.id,
                    email: body.email,
                })
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(IdentityError::InvalidToken)
            }
            s => Err(IdentityError::Upstream(s)),
        }
    }

    async fn lookup_email(&self, user_id: &str) -> Result<Option<String>, IdentityError> {
        let resp = self.admin(reqwest::Method::GET, user_id).send().await?;
        match resp.status() {
            s if s.is_success() => Ok(resp.json::<AuthUserBody>().await?.email),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            s => Err(IdentityError::Upstream(s)),
        }
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError> {
        let resp = self.admin(reqwest::Method::DELETE, user_id).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(IdentityError::Upstream(resp.status()))
        }
    }
}
