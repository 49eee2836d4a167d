//! Bearer token verification
//!
//! Tokens are HS256 JWTs carrying a `username` claim and a mandatory `exp`.
//! Once the signature and expiry check out, the username is resolved
//! through the [`KitDirectory`] to decide whether it names a person or a kit.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{
    errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::principal::Principal;
use crate::config::AuthConfig;
use crate::directory::{DirectoryError, KitDirectory};

/// Errors raised while verifying or issuing a credential
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Unknown principal: {0}")]
    UnknownPrincipal(String),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            _ => AuthError::Malformed(err.to_string()),
        }
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(username) => AuthError::UnknownPrincipal(username),
            other => AuthError::Directory(other.to_string()),
        }
    }
}

/// Claims carried by a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    /// Expiry as seconds since the Unix epoch
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// Turns a raw credential into a [`Principal`]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Principal, AuthError>;
}

/// HS256 JWT signer and verifier backed by a shared secret
pub struct JwtAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    directory: Arc<dyn KitDirectory>,
}

impl JwtAuth {
    pub fn new(secret: &[u8], leeway_secs: u64, directory: Arc<dyn KitDirectory>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            directory,
        }
    }

    pub fn from_config(config: &AuthConfig, directory: Arc<dyn KitDirectory>) -> Self {
        Self::new(config.secret.as_bytes(), config.leeway_secs, directory)
    }

    /// Check signature and expiry, returning the claims
    pub fn decode_claims(&self, credential: &str) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(credential, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }

    /// Sign arbitrary claims
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Issue a token for `username` valid for `ttl`
    pub fn issue(&self, username: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now().timestamp().max(0) as u64;
        self.sign(&Claims {
            username: username.to_string(),
            exp: now + ttl.as_secs(),
            iat: Some(now),
        })
    }
}

#[async_trait]
impl TokenVerifier for JwtAuth {
    async fn verify(&self, credential: &str) -> Result<Principal, AuthError> {
        let claims = self.decode_claims(credential)?;
        let principal = self.directory.resolve_principal(&claims.username).await?;
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryDirectory, Kit};

    fn test_auth() -> JwtAuth {
        let directory = InMemoryDirectory::new()
            .with_person("alice")
            .with_kit(Kit::new("kit42").owned_by("alice"));
        JwtAuth::new(b"test-secret", 0, Arc::new(directory))
    }

    #[tokio::test]
    async fn test_verify_kit_token() {
        let auth = test_auth();
        let token = auth.issue("kit42", Duration::from_secs(60)).unwrap();

        let principal = auth.verify(&token).await.unwrap();
        assert_eq!(principal, Principal::kit("kit42"));
    }

    #[tokio::test]
    async fn test_verify_person_token() {
        let auth = test_auth();
        let token = auth.issue("alice", Duration::from_secs(60)).unwrap();

        let principal = auth.verify(&token).await.unwrap();
        assert_eq!(principal, Principal::person("alice"));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let auth = test_auth();
        let now = Utc::now().timestamp() as u64;
        let token = auth
            .sign(&Claims {
                username: "kit42".to_string(),
                exp: now - 3600,
                iat: Some(now - 7200),
            })
            .unwrap();

        let result = auth.verify(&token).await;
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let auth = test_auth();
        let other = JwtAuth::new(b"other-secret", 0, Arc::new(InMemoryDirectory::new()));
        let token = other.issue("kit42", Duration::from_secs(60)).unwrap();

        let result = auth.verify(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let auth = test_auth();
        let result = auth.verify("not-a-jwt").await;
        assert!(matches!(result, Err(AuthError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_unknown_username() {
        let auth = test_auth();
        let token = auth.issue("mallory", Duration::from_secs(60)).unwrap();

        let result = auth.verify(&token).await;
        assert!(matches!(result, Err(AuthError::UnknownPrincipal(name)) if name == "mallory"));
    }
}
