//! Connection Authenticator
//!
//! Runs once per connection, before the WebSocket upgrade completes. A
//! missing or invalid credential is not fatal: the connection proceeds
//! anonymously and is only refused kit-scoped operations later on.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Deserialize;

use crate::auth::{Principal, TokenVerifier};

/// Query parameters accepted on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Pull the credential from the `token` query parameter, falling back to
/// an `Authorization: Bearer`/`JWT` header.
pub fn extract_credential(params: &ConnectParams, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    let known_scheme = scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("jwt");
    (known_scheme && !token.is_empty()).then(|| token.to_string())
}

/// Resolve the connection's principal, or `None` for anonymous connections
pub async fn authenticate(
    verifier: &dyn TokenVerifier,
    credential: Option<&str>,
) -> Option<Principal> {
    let credential = credential?;
    match verifier.verify(credential).await {
        Ok(principal) => {
            tracing::debug!(principal = %principal, "Connection authenticated");
            Some(principal)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Credential rejected, continuing anonymously");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtAuth;
    use crate::directory::{InMemoryDirectory, Kit};
    use axum::http::HeaderValue;
    use std::sync::Arc;
    use std::time::Duration;

    fn auth() -> JwtAuth {
        let directory = InMemoryDirectory::new()
            .with_person("alice")
            .with_kit(Kit::new("kit42").owned_by("alice"));
        JwtAuth::new(b"test-secret", 0, Arc::new(directory))
    }

    #[test]
    fn test_extract_from_query() {
        let params = ConnectParams {
            token: Some("abc".to_string()),
        };
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));

        assert_eq!(extract_credential(&params, &headers), Some("abc".to_string()));
    }

    #[test]
    fn test_extract_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("JWT xyz"));
        assert_eq!(
            extract_credential(&ConnectParams::default(), &headers),
            Some("xyz".to_string())
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(extract_credential(&ConnectParams::default(), &headers), None);
    }

    #[test]
    fn test_extract_nothing() {
        let params = ConnectParams {
            token: Some(String::new()),
        };
        assert_eq!(extract_credential(&params, &HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_authenticate_kit() {
        let auth = auth();
        let token = auth.issue("kit42", Duration::from_secs(60)).unwrap();

        let principal = authenticate(&auth, Some(token.as_str())).await;
        assert_eq!(principal, Some(Principal::kit("kit42")));
    }

    #[tokio::test]
    async fn test_invalid_credential_is_anonymous() {
        let auth = auth();
        assert_eq!(authenticate(&auth, Some("garbage")).await, None);
        assert_eq!(authenticate(&auth, None).await, None);
    }
}
