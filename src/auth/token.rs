//! Bearer token minting and validation.
//!
//! Access and refresh tokens are signed with different HMAC secrets, so a
//! leaked access secret cannot be used to mint refresh tokens. The token
//! kind is part of the signed claims and checked on validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::security::Role;

const ISSUER: &str = "taskmaster";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("unexpected token kind")]
    WrongKind,

    #[error("invalid token signature")]
    BadSignature,

    #[error("token signing failed")]
    Signing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub username: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Identity fields baked into every minted token.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    pub account_id: String,
    pub email: String,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds
    pub expires_in: i64,
}

pub struct TokenManager {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenManager {
    #[must_use]
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    #[must_use]
    pub const fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access/refresh pair for one identity.
    pub fn generate_pair(&self, identity: &TokenIdentity) -> Result<TokenPair, TokenError> {
        let access = self.sign(identity, TokenKind::Access)?;
        let refresh = self.sign(identity, TokenKind::Refresh)?;

        Ok(TokenPair {
            access_token: access,
            refresh_token: refresh,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub fn validate_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate(token, TokenKind::Access, &self.access_decoding)
    }

    pub fn validate_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate(token, TokenKind::Refresh, &self.refresh_decoding)
    }

    /// Mint a fresh access token from a valid refresh token.
    pub fn refresh_access(&self, refresh_token: &str) -> Result<(String, i64), TokenError> {
        let claims = self.validate_refresh(refresh_token)?;
        let identity = TokenIdentity {
            account_id: claims.sub,
            email: claims.email,
            username: claims.username,
            role: claims.role,
        };
        let access = self.sign(&identity, TokenKind::Access)?;
        Ok((access, self.access_ttl.num_seconds()))
    }

    fn sign(&self, identity: &TokenIdentity, kind: TokenKind) -> Result<String, TokenError> {
        let (key, ttl) = match kind {
            TokenKind::Access => (&self.access_encoding, self.access_ttl),
            TokenKind::Refresh => (&self.refresh_encoding, self.refresh_ttl),
        };

        let now = Utc::now();
        let claims = Claims {
            sub: identity.account_id.clone(),
            email: identity.email.clone(),
            username: identity.username.clone(),
            role: identity.role,
            kind,
            jti: Uuid::new_v4().to_string(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, key).map_err(|_| TokenError::Signing)
    }

    fn validate(
        &self,
        token: &str,
        expected: TokenKind,
        key: &DecodingKey,
    ) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);

        let data = decode::<Claims>(token, key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            _ => TokenError::Malformed,
        })?;

        if data.claims.kind != expected {
            return Err(TokenError::WrongKind);
        }

        Ok(data.claims)
    }
}

/// Extract the raw token from an `Authorization` header value.
///
/// Accepts strictly the `Bearer <token>` form.
pub fn extract_bearer(header: &str) -> Result<&str, TokenError> {
    header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or(TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new(
            "test-access-secret-0123456789abcdef",
            "test-refresh-secret-0123456789abcdef",
            Duration::minutes(15),
            Duration::days(7),
        )
    }

    fn identity() -> TokenIdentity {
        TokenIdentity {
            account_id: "a4f3c2d1-0000-4000-8000-000000000001".to_string(),
            email: "alice@e.com".to_string(),
            username: "alice".to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn pair_round_trips_identity() {
        let tm = manager();
        let pair = tm.generate_pair(&identity()).unwrap();

        let claims = tm.validate_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, identity().account_id);
        assert_eq!(claims.email, "alice@e.com");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(pair.expires_in, 15 * 60);

        let claims = tm.validate_refresh(&pair.refresh_token).unwrap();
        assert_eq!(claims.kind, TokenKind::Refresh);
    }

    #[test]
    fn kinds_do_not_cross_validate() {
        let tm = manager();
        let pair = tm.generate_pair(&identity()).unwrap();

        // Different secrets mean the signature check fails before the
        // kind check is even reached.
        assert_eq!(
            tm.validate_refresh(&pair.access_token).unwrap_err(),
            TokenError::BadSignature
        );
        assert_eq!(
            tm.validate_access(&pair.refresh_token).unwrap_err(),
            TokenError::BadSignature
        );
    }

    #[test]
    fn same_secret_still_rejects_wrong_kind() {
        let tm = TokenManager::new(
            "shared-secret-0123456789abcdefshared",
            "shared-secret-0123456789abcdefshared",
            Duration::minutes(15),
            Duration::days(7),
        );
        let pair = tm.generate_pair(&identity()).unwrap();

        assert_eq!(
            tm.validate_refresh(&pair.access_token).unwrap_err(),
            TokenError::WrongKind
        );
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let tm = TokenManager::new(
            "test-access-secret-0123456789abcdef",
            "test-refresh-secret-0123456789abcdef",
            Duration::seconds(-120),
            Duration::days(7),
        );
        let pair = tm.generate_pair(&identity()).unwrap();

        let err = manager().validate_access(&pair.access_token).unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn refresh_access_mints_only_access() {
        let tm = manager();
        let pair = tm.generate_pair(&identity()).unwrap();

        let (access, ttl) = tm.refresh_access(&pair.refresh_token).unwrap();
        assert_eq!(ttl, 15 * 60);
        assert!(tm.validate_access(&access).is_ok());

        assert!(tm.refresh_access(&pair.access_token).is_err());
    }

    #[test]
    fn bearer_extraction_is_strict() {
        assert_eq!(extract_bearer("Bearer abc").unwrap(), "abc");
        assert!(extract_bearer("bearer abc").is_err());
        assert!(extract_bearer("Basic abc").is_err());
        assert!(extract_bearer("Bearer").is_err());
        assert!(extract_bearer("").is_err());
    }

    #[test]
    fn garbage_token_is_malformed() {
        assert_eq!(
            manager().validate_access("not.a.jwt").unwrap_err(),
            TokenError::Malformed
        );
    }
}
