//! Manage json web tokens.
//!
//! Access and refresh credentials are both JWTs signed with the same
//! secret. Refresh tokens are single-use: presenting one blacklists its
//! `jti` in the shared cache until its natural expiry, so rotation stays
//! correct across worker processes.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::error::{Result, ServerError};

const ACCESS_TOKEN_TYPE: &str = "access";
const REFRESH_TOKEN_TYPE: &str = "refresh";
const BLACKLIST_PREFIX: &str = "token_blacklist";

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    /// Token kind, `access` or `refresh`.
    pub token_type: String,
    /// Unique token ID, present on refresh tokens for rotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Custom claims mirrored from the user record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub email: String,
}

/// A freshly issued access + refresh credential pair.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    name: String,
    audience: String,
    access_lifetime_secs: u64,
    refresh_lifetime_secs: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance.
    pub fn new(
        name: &str,
        secret: &str,
        access_lifetime_minutes: i64,
        refresh_lifetime_days: i64,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            name: name.to_owned(),
            audience: name.to_owned(),
            access_lifetime_secs: (access_lifetime_minutes.max(1) as u64) * 60,
            refresh_lifetime_secs: (refresh_lifetime_days.max(1) as u64) * 24 * 60 * 60,
        }
    }

    /// Set `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    fn claims(
        &self,
        user_id: &str,
        username: Option<&str>,
        email: &str,
        token_type: &str,
        lifetime: u64,
    ) -> Claims {
        let time = Self::now();
        Claims {
            aud: self.audience.clone(),
            exp: time + lifetime,
            iat: time,
            iss: self.name.clone(),
            sub: user_id.to_owned(),
            token_type: token_type.to_owned(),
            jti: (token_type == REFRESH_TOKEN_TYPE)
                .then(|| uuid::Uuid::new_v4().to_string()),
            username: username.map(str::to_owned),
            email: email.to_owned(),
        }
    }

    /// Issue a new access + refresh pair for an identity.
    pub fn issue(
        &self,
        user_id: &str,
        username: Option<&str>,
        email: &str,
    ) -> Result<TokenPair> {
        let header = Header::new(Algorithm::HS256);
        let access = self.claims(
            user_id,
            username,
            email,
            ACCESS_TOKEN_TYPE,
            self.access_lifetime_secs,
        );
        let refresh = self.claims(
            user_id,
            username,
            email,
            REFRESH_TOKEN_TYPE,
            self.refresh_lifetime_secs,
        );

        Ok(TokenPair {
            access: encode(&header, &access, &self.encoding_key)
                .map_err(|err| ServerError::internal(err))?,
            refresh: encode(&header, &refresh, &self.encoding_key)
                .map_err(|err| ServerError::internal(err))?,
        })
    }

    fn decode(&self, token: &str, token_type: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.audience]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| ServerError::Unauthorized)?
            .claims;

        if claims.token_type != token_type {
            return Err(ServerError::Unauthorized);
        }

        Ok(claims)
    }

    /// Decode and check an access token.
    pub fn authenticate(&self, token: &str) -> Result<Claims> {
        self.decode(token, ACCESS_TOKEN_TYPE)
    }

    /// Decode and check a refresh token, rejecting already rotated ones.
    /// On success the presented token is blacklisted until its expiry and a
    /// fresh pair is issued.
    pub async fn rotate(&self, cache: &Cache, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.decode(refresh_token, REFRESH_TOKEN_TYPE)?;
        let jti = claims.jti.as_deref().ok_or(ServerError::Unauthorized)?;
        let key = format!("{BLACKLIST_PREFIX}:{jti}");

        // SET NX keeps the claim atomic: of two concurrent presentations of
        // the same token, exactly one wins.
        let remaining = claims.exp.saturating_sub(Self::now()).max(1);
        if !cache.set_if_absent(&key, "1", remaining).await? {
            return Err(ServerError::Unauthorized);
        }

        self.issue(&claims.sub, claims.username.as_deref(), &claims.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new("saksin", "unsafe-secret", 5, 1)
    }

    #[test]
    fn test_issue_and_authenticate() {
        let manager = manager();
        let pair = manager
            .issue("user-1", Some("alice"), "alice@saksin.app")
            .unwrap();

        let claims = manager.authenticate(&pair.access).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.email, "alice@saksin.app");
        assert_eq!(claims.token_type, "access");
        assert!(claims.jti.is_none());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let manager = manager();
        let pair = manager.issue("user-1", None, "a@x.com").unwrap();

        assert!(manager.authenticate(&pair.refresh).is_err());
    }

    #[test]
    fn test_refresh_tokens_carry_unique_jti() {
        let manager = manager();
        let first = manager.issue("user-1", None, "a@x.com").unwrap();
        let second = manager.issue("user-1", None, "a@x.com").unwrap();

        let decode = |token: &str| manager.decode(token, REFRESH_TOKEN_TYPE).unwrap();
        assert_ne!(decode(&first.refresh).jti, decode(&second.refresh).jti);
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(manager().authenticate("not.a.token").is_err());
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let pair = manager().issue("user-1", None, "a@x.com").unwrap();
        let other = TokenManager::new("saksin", "different-secret", 5, 1);
        assert!(other.authenticate(&pair.access).is_err());
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let manager = manager();
        let cache = Cache::memory();
        let pair = manager.issue("user-1", Some("alice"), "a@x.com").unwrap();

        let rotated = manager.rotate(&cache, &pair.refresh).await.unwrap();
        let claims = manager.authenticate(&rotated.access).unwrap();
        assert_eq!(claims.sub, "user-1");

        // Replaying the spent token must fail, the fresh one must work.
        assert!(matches!(
            manager.rotate(&cache, &pair.refresh).await,
            Err(ServerError::Unauthorized)
        ));
        assert!(manager.rotate(&cache, &rotated.refresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_access_token_cannot_rotate() {
        let manager = manager();
        let cache = Cache::memory();
        let pair = manager.issue("user-1", None, "a@x.com").unwrap();

        assert!(manager.rotate(&cache, &pair.access).await.is_err());
    }
}
