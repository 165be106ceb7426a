//! Identity and admin authentication.
//!
//! Callers are authenticated upstream; the gateway forwards the profile id
//! in a trusted header. Admin endpoints use a static bearer token.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use tandem_shared::types::ProfileId;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::error::ServerError;

/// The authenticated profile making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub ProfileId);

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(state.config.identity_header.as_str())
            .and_then(|v| v.to_str().ok())
            .ok_or(ServerError::Unauthorized)?;
        let profile = raw
            .parse::<ProfileId>()
            .map_err(|_| ServerError::Unauthorized)?;
        Ok(Actor(profile))
    }
}

pub fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Unauthorized);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(token: Option<&str>) -> ServerConfig {
        ServerConfig {
            admin_token: token.map(str::to_string),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn admin_token_checks() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            verify_admin_token(&headers, &config(None)),
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            verify_admin_token(&headers, &config(Some("s3cret"))),
            Err(ServerError::Unauthorized)
        ));

        headers.insert("authorization", HeaderValue::from_static("Bearer s3cre"));
        assert!(verify_admin_token(&headers, &config(Some("s3cret"))).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        assert!(verify_admin_token(&headers, &config(Some("s3cret"))).is_ok());
    }
}
