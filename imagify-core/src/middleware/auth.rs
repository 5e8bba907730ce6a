//! User authentication for user-scoped routes.
//!
//! The auth service issues a JWT at login with the user id in the `id` claim.
//! Handlers receive the verified user id through the `AuthUser` extractor;
//! requests without a valid bearer token are rejected before the handler runs.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use crate::error::AppError;

/// Verification settings for user session tokens.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
}

/// Claims carried by a session token.
#[derive(Debug, Deserialize)]
pub struct Claims {
    /// User id the token was issued for.
    pub id: String,
}

/// Decode and verify a session token against the shared signing secret.
///
/// Session tokens are minted without an `exp` claim, so expiry validation
/// is disabled and only the HS256 signature is checked.
pub fn decode_user_token(jwt_secret: &Secret<String>, token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.expose_secret().as_bytes()),
        &validation,
    )?;

    Ok(token_data.claims)
}

/// Authenticated user extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync + AsRef<AuthConfig>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Not authorized. Login again")))?;

        let claims = decode_user_token(&state.as_ref().jwt_secret, token)?;

        // Add to tracing span for observability
        let span = tracing::Span::current();
        span.record("user_id", claims.id.as_str());

        Ok(AuthUser { user_id: claims.id })
    }
}
