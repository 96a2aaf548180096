use std::str::FromStr;

use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use netwatch_store::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::CallerIdentity;

/// Distinguishes an access token from a refresh token so `/auth/refresh`
/// can reject an access token presented in its place, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims embedded in issued tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    pub username: String,
    /// Unique token ID for revocation tracking.
    pub jti: String,
    pub role: String,
    typ: TokenKind,
    /// Expiry (seconds since epoch).
    pub exp: usize,
}

/// `{access_token, refresh_token, expires_in}` as returned by `/auth/login`
/// and `/auth/refresh` (§6.3).
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Manages JWT issuance and validation with in-process revocation tracking.
///
/// The reference stack's `JwtManager` tracks live `jti`s in a shared state
/// store so revocation is visible across replicas; this core has no such
/// store to lean on, so revoked `jti`s live in a process-local `DashMap`
/// instead, swept lazily of expired entries on each validation.
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_expiry_seconds: u64,
    refresh_expiry_seconds: u64,
    revoked: DashMap<String, chrono::DateTime<Utc>>,
}

impl JwtManager {
    #[must_use]
    pub fn new(secret: &str, access_expiry_seconds: u64, refresh_expiry_seconds: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_expiry_seconds,
            refresh_expiry_seconds,
            revoked: DashMap::new(),
        }
    }

    #[must_use]
    pub const fn access_expiry_seconds(&self) -> u64 {
        self.access_expiry_seconds
    }

    /// Issue a fresh access/refresh pair for `identity`.
    pub fn issue_pair(&self, identity: &CallerIdentity) -> Result<TokenPair, String> {
        let sub = Uuid::parse_str(&identity.id).map_err(|_| "caller id is not a valid user id".to_owned())?;
        let access_token = self.encode(sub, &identity.username, &identity.role, TokenKind::Access, self.access_expiry_seconds)?;
        let refresh_token = self.encode(sub, &identity.username, &identity.role, TokenKind::Refresh, self.refresh_expiry_seconds)?;
        Ok(TokenPair { access_token, refresh_token, expires_in: self.access_expiry_seconds })
    }

    fn encode(&self, sub: Uuid, username: &str, role: &Role, typ: TokenKind, expiry_seconds: u64) -> Result<String, String> {
        #[allow(clippy::cast_possible_truncation)]
        let exp = jsonwebtoken::get_current_timestamp() as usize + expiry_seconds as usize;
        let claims = Claims {
            sub,
            username: username.to_owned(),
            jti: Uuid::new_v4().to_string(),
            role: role.to_string(),
            typ,
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| format!("JWT encoding failed: {e}"))
    }

    /// Validate an access token's signature, expiry, kind, and revocation
    /// status, returning the caller it identifies.
    pub fn validate_token(&self, token: &str) -> Result<CallerIdentity, String> {
        let claims = self.decode_and_check(token, TokenKind::Access)?;
        let role = Role::from_str(&claims.role).map_err(|_| format!("invalid role in token: {}", claims.role))?;
        Ok(CallerIdentity { id: claims.sub.to_string(), username: claims.username, role, auth_method: "jwt".to_owned() })
    }

    /// Validate a refresh token and, if valid, rotate it: the old `jti` is
    /// revoked and a new access/refresh pair is issued (§6.3 "Rotates
    /// token pair").
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, String> {
        let claims = self.decode_and_check(refresh_token, TokenKind::Refresh)?;
        self.revoke_jti(&claims.jti, self.refresh_expiry_seconds);

        let role = Role::from_str(&claims.role).map_err(|_| format!("invalid role in token: {}", claims.role))?;
        let identity = CallerIdentity { id: claims.sub.to_string(), username: claims.username, role, auth_method: "jwt".to_owned() };
        self.issue_pair(&identity)
    }

    /// Revoke a token (logout). Idempotent; a malformed token is simply
    /// treated as already invalid.
    pub fn revoke_token(&self, token: &str) {
        if let Ok(token_data) = decode::<Claims>(token, &self.decoding_key, &Validation::default()) {
            self.revoke_jti(&token_data.claims.jti, self.refresh_expiry_seconds);
        }
    }

    fn decode_and_check(&self, token: &str, expected: TokenKind) -> Result<Claims, String> {
        self.sweep_expired();
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| format!("invalid token: {e}"))?
            .claims;
        if claims.typ != expected {
            return Err("wrong token type".to_owned());
        }
        if self.revoked.contains_key(&claims.jti) {
            return Err("token has been revoked".to_owned());
        }
        Ok(claims)
    }

    fn revoke_jti(&self, jti: &str, ttl_seconds: u64) {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds as i64);
        self.revoked.insert(jti.to_owned(), expires_at);
    }

    fn sweep_expired(&self) {
        let now = Utc::now();
        self.revoked.retain(|_, expires_at| *expires_at > now);
    }
}
