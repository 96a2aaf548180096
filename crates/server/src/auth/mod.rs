pub mod api_key;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod password;

use std::sync::Arc;

use chrono::Utc;
use netwatch_store::DurableStore;

use self::identity::CallerIdentity;
use self::jwt::{JwtManager, TokenPair};

/// Thin auth layer over the Durable Store: users and API keys live there
/// (created through `/users` and `/api-keys`), not in a hot-reloadable
/// config file as in the reference stack — so this provider only owns the
/// JWT signing/revocation state and forwards lookups to the store.
pub struct AuthProvider<S: DurableStore> {
    store: Arc<S>,
    jwt: JwtManager,
}

impl<S: DurableStore> AuthProvider<S> {
    const ACCESS_TOKEN_EXPIRY_SECONDS: u64 = 3600;
    const REFRESH_TOKEN_EXPIRY_SECONDS: u64 = 7 * 24 * 3600;

    #[must_use]
    pub fn new(store: Arc<S>, jwt_secret: &str) -> Self {
        Self {
            store,
            jwt: JwtManager::new(jwt_secret, Self::ACCESS_TOKEN_EXPIRY_SECONDS, Self::REFRESH_TOKEN_EXPIRY_SECONDS),
        }
    }

    /// Authenticate by username/password and issue an access/refresh pair.
    ///
    /// # Errors
    ///
    /// Returns an error string for invalid credentials or an inactive
    /// account; both map to 401 at the API boundary.
    pub async fn login(&self, username: &str, password_candidate: &str) -> Result<(TokenPair, netwatch_store::User), String> {
        let user = self
            .store
            .get_user_by_username(username)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "invalid credentials".to_owned())?;

        if !user.is_active {
            return Err("account is disabled".to_owned());
        }
        if !password::verify_password(&user.password_hash, password_candidate) {
            return Err("invalid credentials".to_owned());
        }

        let identity = CallerIdentity {
            id: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            auth_method: "jwt".to_owned(),
        };
        let pair = self.jwt.issue_pair(&identity)?;

        let _ = self.store.touch_login(user.id, Utc::now()).await;

        Ok((pair, user))
    }

    /// Rotate a refresh token into a fresh access/refresh pair.
    ///
    /// # Errors
    ///
    /// Returns an error string if the refresh token is expired, revoked,
    /// or not actually a refresh token.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, String> {
        self.jwt.refresh(refresh_token)
    }

    /// Validate a JWT and return the caller identity.
    ///
    /// # Errors
    ///
    /// Returns an error string describing why the token is invalid
    /// (expired, malformed, or revoked), mapped to 401 at the API boundary.
    pub fn validate_jwt(&self, token: &str) -> Result<CallerIdentity, String> {
        self.jwt.validate_token(token)
    }

    pub fn revoke_jwt(&self, token: &str) {
        self.jwt.revoke_token(token);
    }

    /// Look up an API key by its raw value and, if active and unexpired,
    /// resolve the owning user into a [`CallerIdentity`].
    pub async fn authenticate_api_key(&self, raw_key: &str) -> Option<CallerIdentity> {
        let hash = api_key::hash_api_key(raw_key);
        let key = self.store.find_api_key_by_hash(&hash).await.ok().flatten()?;
        if !key.is_active {
            return None;
        }
        if key.expires_at.is_some_and(|exp| exp < Utc::now()) {
            return None;
        }

        let user = self.store.get_user(key.user_id).await.ok().flatten()?;
        if !user.is_active {
            return None;
        }

        let _ = self.store.touch_api_key(key.id, Utc::now()).await;

        Some(CallerIdentity {
            id: user.id.to_string(),
            username: user.username,
            role: user.role,
            auth_method: "api_key".to_owned(),
        })
    }
}
