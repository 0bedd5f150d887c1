//! Session authentication against the external identity service
//!
//! The gateway never issues or stores sessions itself; it extracts the
//! caller's bearer token and asks the identity service whether it belongs
//! to a live principal. Authentication failure is terminal for the request,
//! no retries.

use axum::http::{HeaderMap, header};
use serde::Deserialize;

use crate::error::{GatewayError, Result};

/// Verified user record returned by the identity service
#[derive(Debug, Deserialize)]
struct IdentityUser {
    id: String,
}

/// Extract a bearer token from the request headers.
///
/// Scheme matching is case-insensitive and the token is trimmed. Absent or
/// malformed credentials are indistinguishable to the caller; both read as
/// a missing token.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| GatewayError::Unauthenticated("Missing auth token.".to_string()))?;

    let mut parts = raw.trim().splitn(2, char::is_whitespace);
    let scheme = parts.next().unwrap_or("");
    let token = parts.next().unwrap_or("").trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(GatewayError::Unauthenticated(
            "Missing auth token.".to_string(),
        ));
    }

    Ok(token.to_string())
}

/// Verifies bearer tokens against the identity service.
///
/// Holds everything resolved at startup; request handling never touches the
/// environment.
#[derive(Clone)]
pub struct Authenticator {
    client: reqwest::Client,
    identity_url: String,
    anon_key: Option<String>,
}

impl Authenticator {
    pub fn new(client: reqwest::Client, identity_url: String, anon_key: Option<String>) -> Self {
        Self {
            client,
            identity_url,
            anon_key,
        }
    }

    /// Verify the credential carried by a request and return the principal id.
    ///
    /// A missing identity endpoint or anon key is an operational fault and
    /// surfaces as [`GatewayError::MisconfiguredService`]; every rejection by
    /// the service itself reads as [`GatewayError::Unauthenticated`].
    pub async fn verify(&self, headers: &HeaderMap) -> Result<String> {
        let token = extract_bearer_token(headers)?;

        if self.identity_url.trim().is_empty() {
            return Err(GatewayError::MisconfiguredService(
                "Identity service URL is not configured on the server.".to_string(),
            ));
        }
        let anon_key = self.anon_key.as_deref().ok_or_else(|| {
            GatewayError::MisconfiguredService(
                "Identity service anon key is not configured on the server.".to_string(),
            )
        })?;

        let url = format!(
            "{}/auth/v1/user",
            self.identity_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .header("apikey", anon_key)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("identity service unreachable: {e}");
                GatewayError::Unauthenticated("Invalid session.".to_string())
            })?;

        if !response.status().is_success() {
            tracing::debug!("identity service rejected token: {}", response.status());
            return Err(GatewayError::Unauthenticated(
                "Invalid session.".to_string(),
            ));
        }

        let user: IdentityUser = response
            .json()
            .await
            .map_err(|_| GatewayError::Unauthenticated("Invalid session.".to_string()))?;

        Ok(user.id)
    }
}
