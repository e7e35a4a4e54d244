//! Token issuance and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::sync::Arc;

use super::claims::Claims;
use super::error::AuthError;
use crate::user::User;

/// Default access token lifetime in minutes.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;

/// Shared authentication state: the HS256 secret and token lifetime.
#[derive(Clone)]
pub struct AuthState {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
}

impl AuthState {
    /// Create auth state from a shared secret.
    pub fn new(jwt_secret: &str, token_ttl_minutes: i64) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
                decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
                token_ttl: Duration::minutes(token_ttl_minutes),
            }),
        }
    }

    /// Issue an access token for a user.
    pub fn generate_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            exp: (now + self.inner.token_ttl).timestamp(),
            iat: Some(now.timestamp()),
            email: Some(user.email.clone()),
            username: Some(user.username.clone()),
        };

        encode(&Header::default(), &claims, &self.inner.encoding_key)
            .map_err(|e| AuthError::Internal(format!("signing token: {}", e)))
    }

    /// Verify a token and return its claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.inner.decoding_key, &Validation::default())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState").finish_non_exhaustive()
    }
}
