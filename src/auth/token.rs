use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AppError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token required")]
    MissingToken,
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("Invalid password")]
    InvalidPassword,
    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

/// Issues and checks the HS256 bearer tokens handed out by `POST /users`.
#[derive(Clone)]
pub struct Tokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl Tokens {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user: &str) -> Result<String, AuthError> {
        let exp = (OffsetDateTime::now_utc() + self.ttl).unix_timestamp().max(0) as u64;
        self.sign(&Claims { sub: user.to_owned(), exp })
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(AuthError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e),
            })
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The caller's user name, taken from a verified bearer token.
///
/// Reads `Authorization: Bearer <token>`, falling back to a `token` query
/// parameter for browsers, which cannot set headers on a websocket upgrade.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    Tokens: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_owned);
        let token = match header {
            Some(token) => Some(token),
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| q.token),
        }
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)?;

        let claims = Tokens::from_ref(state).verify(&token)?;
        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> Tokens {
        Tokens::new(b"test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn issued_token_verifies() {
        let tokens = tokens();
        let token = tokens.issue("alice").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.exp > OffsetDateTime::now_utc().unix_timestamp() as u64);
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = tokens().issue("alice").unwrap();
        let other = Tokens::new(b"another-secret", Duration::from_secs(3600));
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = tokens();
        let exp = OffsetDateTime::now_utc().unix_timestamp() as u64 - 10;
        let token = tokens.sign(&Claims { sub: "alice".into(), exp }).unwrap();
        assert!(matches!(tokens.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(tokens().verify("not.a.token"), Err(AuthError::InvalidToken(_))));
        assert!(matches!(tokens().verify(""), Err(AuthError::InvalidToken(_))));
    }
}
