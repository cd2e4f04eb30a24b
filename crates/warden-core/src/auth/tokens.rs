//! Issuing, validating and revoking signed tokens.
//!
//! Validation order is fixed: signature and structure, then expiry against
//! the injected clock, then kind, then the revocation store. Only the last
//! step does I/O, and its answer may be cached for
//! [`TokenConfig::revocation_cache_ttl`]. The cache holds at most
//! [`TokenConfig::revocation_cache_capacity`] entries.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::jwt::{self, Claims, TokenKind};
use crate::clock::SharedClock;
use crate::config::TokenConfig;
use crate::store::{CredentialStore, NewRevocation, RevocationStore, SharedStore, StoreError};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed or its signature is invalid")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("expected a {expected} token, got {found}")]
    WrongKind { expected: TokenKind, found: TokenKind },

    #[error("token has been revoked")]
    Revoked,

    /// `revoke` was handed something that does not parse as a token.
    #[error("token cannot be parsed")]
    AlreadyInvalidFormat,

    /// The token's user no longer exists or is deactivated.
    #[error("token subject is unavailable")]
    SubjectUnavailable,

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Access and refresh token handed out at login.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone, Copy)]
struct CachedLookup {
    revoked: bool,
    cached_at: Instant,
}

#[derive(Clone)]
pub struct TokenService {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    config: TokenConfig,
    store: SharedStore,
    clock: SharedClock,
    /// jti → last known revocation state
    cache: RwLock<HashMap<String, CachedLookup>>,
}

impl TokenService {
    pub fn new(config: TokenConfig, store: SharedStore, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                config,
                store,
                clock,
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }

    fn secret(&self) -> &[u8] {
        self.inner.config.secret.as_bytes()
    }

    /// Issue a signed token of `kind` for a user.
    pub fn issue(&self, user_id: i32, kind: TokenKind) -> Result<String, TokenError> {
        let claims = Claims::new(user_id, kind, self.inner.clock.now());
        jwt::encode_claims(&claims, self.secret()).map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn issue_pair(&self, user_id: i32) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue(user_id, TokenKind::Access)?,
            refresh_token: self.issue(user_id, TokenKind::Refresh)?,
        })
    }

    /// Check a presented token and return its claims.
    pub async fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = jwt::decode_claims(token, self.secret()).map_err(|e| {
            tracing::debug!(error = %e, "token failed signature or structure check");
            TokenError::Malformed
        })?;
        if claims.user_id().is_none() {
            return Err(TokenError::Malformed);
        }

        if claims.is_expired_at(self.inner.clock.now()) {
            return Err(TokenError::Expired);
        }

        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                found: claims.kind,
            });
        }

        if self.is_revoked(&claims.jti).await? {
            return Err(TokenError::Revoked);
        }

        Ok(claims)
    }

    /// Record a token as revoked.
    ///
    /// Expired tokens are accepted and nothing is recorded for them, since
    /// validation already rejects them. Revoking twice is not an error.
    pub async fn revoke(&self, token: &str) -> Result<(), TokenError> {
        let claims = jwt::decode_claims(token, self.secret())
            .map_err(|_| TokenError::AlreadyInvalidFormat)?;
        if claims.user_id().is_none() || claims.expires_at().is_none() {
            return Err(TokenError::AlreadyInvalidFormat);
        }

        if claims.is_expired_at(self.inner.clock.now()) {
            tracing::debug!(jti = %claims.jti, "revoking an expired token; nothing to record");
            return Ok(());
        }

        if !self.record_revocation(&claims).await? {
            tracing::debug!(jti = %claims.jti, "token was already revoked");
        }
        Ok(())
    }

    /// Validate a single-use token and revoke it in the same step.
    ///
    /// Of several concurrent callers presenting the same token, exactly one
    /// gets the claims; the others see `Revoked`.
    pub async fn consume(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.validate(token, expected).await?;
        if !self.record_revocation(&claims).await? {
            return Err(TokenError::Revoked);
        }
        Ok(claims)
    }

    /// Insert the revocation row for `claims`. `false` when the jti was
    /// already recorded.
    async fn record_revocation(&self, claims: &Claims) -> Result<bool, TokenError> {
        let (Some(user_id), Some(expires_at)) = (claims.user_id(), claims.expires_at()) else {
            return Err(TokenError::Malformed);
        };

        let recorded = self
            .inner
            .store
            .insert_revocation(NewRevocation {
                jti: claims.jti.clone(),
                token_type: claims.kind.as_str().to_string(),
                user_id,
                revoked_at: self.inner.clock.now(),
                expires_at,
            })
            .await;

        let fresh = match recorded {
            Ok(_) => {
                tracing::info!(jti = %claims.jti, kind = %claims.kind, user_id, "token revoked");
                true
            }
            Err(StoreError::Conflict(_)) => false,
            Err(e) => return Err(e.into()),
        };

        self.remember(&claims.jti, true).await;
        Ok(fresh)
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token itself stays valid until it expires or is revoked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.validate(refresh_token, TokenKind::Refresh).await?;
        let user_id = claims.user_id().ok_or(TokenError::Malformed)?;

        match self.inner.store.user_by_id(user_id).await? {
            Some(user) if user.is_active => self.issue(user.id, TokenKind::Access),
            _ => Err(TokenError::SubjectUnavailable),
        }
    }

    /// Drop revocation records for tokens that have expired anyway.
    pub async fn purge_expired(&self) -> Result<u64, TokenError> {
        let removed = self
            .inner
            .store
            .purge_revocations(self.inner.clock.now())
            .await?;
        self.inner.cache.write().await.clear();
        tracing::info!(removed, "purged expired revocations");
        Ok(removed)
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, TokenError> {
        let ttl = self.inner.config.revocation_cache_ttl;
        if !ttl.is_zero() {
            let cache = self.inner.cache.read().await;
            if let Some(hit) = cache.get(jti) {
                if hit.cached_at.elapsed() < ttl {
                    return Ok(hit.revoked);
                }
            }
        }

        let revoked = self.inner.store.is_revoked(jti).await?;
        self.remember(jti, revoked).await;
        Ok(revoked)
    }

    async fn remember(&self, jti: &str, revoked: bool) {
        let ttl = self.inner.config.revocation_cache_ttl;
        if ttl.is_zero() {
            return;
        }
        let capacity = self.inner.config.revocation_cache_capacity.max(1);
        let mut cache = self.inner.cache.write().await;
        if cache.len() >= capacity && !cache.contains_key(jti) {
            cache.retain(|_, hit| hit.cached_at.elapsed() < ttl);
            if cache.len() >= capacity {
                let oldest = cache
                    .iter()
                    .min_by_key(|(_, hit)| hit.cached_at)
                    .map(|(jti, _)| jti.clone());
                if let Some(oldest) = oldest {
                    cache.remove(&oldest);
                }
            }
        }
        cache.insert(
            jti.to_string(),
            CachedLookup {
                revoked,
                cached_at: Instant::now(),
            },
        );
    }
}
