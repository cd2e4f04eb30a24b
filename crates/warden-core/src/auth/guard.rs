//! The per-request access decision, independent of any web framework.
//!
//! Order of checks: bearer token present, token valid as an access token,
//! subject exists and is active, RBAC grants the endpoint. Every failure
//! before the RBAC step is a 401 and RBAC is never consulted for it.

use serde::Serialize;

use super::jwt::TokenKind;
use super::rbac::RbacService;
use super::tokens::TokenService;
use crate::error::{AuthFailure, WardenError};
use crate::store::{CredentialStore, SharedStore};

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: i32,
    pub jti: String,
    #[serde(skip)]
    pub token: String,
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, WardenError> {
    let header = header.ok_or(WardenError::Unauthenticated(AuthFailure::MissingToken))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(WardenError::Unauthenticated(AuthFailure::Malformed))
}

#[derive(Clone)]
pub struct Authorizer {
    tokens: TokenService,
    rbac: RbacService,
    store: SharedStore,
}

impl Authorizer {
    pub fn new(tokens: TokenService, rbac: RbacService, store: SharedStore) -> Self {
        Self {
            tokens,
            rbac,
            store,
        }
    }

    /// Establish who is calling. Fails with 401 for any token problem or a
    /// deleted subject, 403 for a deactivated one.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Principal, WardenError> {
        let token = bearer_token(header)?;
        let claims = self.tokens.validate(token, TokenKind::Access).await?;
        let user_id = claims
            .user_id()
            .ok_or(WardenError::Unauthenticated(AuthFailure::Malformed))?;

        let user = self
            .store
            .user_by_id(user_id)
            .await?
            .ok_or(WardenError::Unauthenticated(AuthFailure::UnknownSubject))?;
        if !user.is_active {
            return Err(WardenError::Forbidden("Account is deactivated".to_string()));
        }

        Ok(Principal {
            user_id,
            jti: claims.jti,
            token: token.to_string(),
        })
    }

    /// Authenticate, then require RBAC to grant `endpoint`.
    pub async fn authorize_request(
        &self,
        header: Option<&str>,
        endpoint: &str,
    ) -> Result<Principal, WardenError> {
        let principal = self.authenticate(header).await?;

        let decision = self
            .rbac
            .authorize_explained(principal.user_id, endpoint)
            .await?;
        if !decision.granted {
            tracing::warn!(
                user_id = principal.user_id,
                endpoint,
                reason = ?decision.reason,
                required = ?decision.required_permission,
                "access denied"
            );
            return Err(WardenError::Forbidden(
                "You do not have permission to access this endpoint".to_string(),
            ));
        }

        tracing::debug!(user_id = principal.user_id, endpoint, "access granted");
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::auth::rbac::NewGrantable;
    use crate::clock::{ManualClock, SharedClock};
    use crate::config::{RbacConfig, TokenConfig};
    use crate::store::{MemoryStore, NewUser, UserChanges};

    struct Fixture {
        authorizer: Authorizer,
        tokens: TokenService,
        rbac: RbacService,
        store: SharedStore,
        user_id: i32,
    }

    async fn fixture() -> Fixture {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let clock: SharedClock = Arc::new(ManualClock::new(Utc::now()));
        let tokens = TokenService::new(TokenConfig::new("guard-secret"), store.clone(), clock.clone());
        let rbac = RbacService::new(&RbacConfig::default(), store.clone(), clock);
        let user_id = store
            .insert_user(
                NewUser {
                    username: "u".to_string(),
                    email: "u@x.com".to_string(),
                    password_hash: "unused".to_string(),
                    is_active: true,
                },
                Utc::now(),
            )
            .await
            .unwrap()
            .id;
        Fixture {
            authorizer: Authorizer::new(tokens.clone(), rbac.clone(), store.clone()),
            tokens,
            rbac,
            store,
            user_id,
        }
    }

    fn header(token: &str) -> String {
        format!("Bearer {}", token)
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert!(matches!(
            bearer_token(None),
            Err(WardenError::Unauthenticated(AuthFailure::MissingToken))
        ));
        assert!(matches!(
            bearer_token(Some("Basic abc")),
            Err(WardenError::Unauthenticated(AuthFailure::Malformed))
        ));
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
    }

    #[tokio::test]
    async fn token_failures_never_reach_rbac() {
        let f = fixture().await;
        let refresh = f.tokens.issue(f.user_id, TokenKind::Refresh).unwrap();
        let err = f
            .authorizer
            .authorize_request(Some(&header(&refresh)), "GET /anything")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WardenError::Unauthenticated(AuthFailure::WrongKind)
        ));
    }

    #[tokio::test]
    async fn denied_by_rbac_is_forbidden() {
        let f = fixture().await;
        let access = f.tokens.issue(f.user_id, TokenKind::Access).unwrap();
        let err = f
            .authorizer
            .authorize_request(Some(&header(&access)), "GET /anything")
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Forbidden(_)));
    }

    #[tokio::test]
    async fn granted_request_yields_principal() {
        let f = fixture().await;
        let role = f
            .rbac
            .create_role(NewGrantable {
                name: "reader".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let perm = f
            .rbac
            .create_permission(NewGrantable {
                name: "read".to_string(),
                description: None,
            })
            .await
            .unwrap();
        f.rbac.assign_role(f.user_id, role.id).await.unwrap();
        f.rbac.assign_permission(role.id, perm.id).await.unwrap();
        f.rbac.map_endpoint("GET /items", perm.id).await.unwrap();

        let access = f.tokens.issue(f.user_id, TokenKind::Access).unwrap();
        let principal = f
            .authorizer
            .authorize_request(Some(&header(&access)), "GET /items")
            .await
            .unwrap();
        assert_eq!(principal.user_id, f.user_id);
    }

    #[tokio::test]
    async fn deleted_and_deactivated_subjects() {
        let f = fixture().await;
        let access = f.tokens.issue(f.user_id, TokenKind::Access).unwrap();

        f.store
            .update_user(
                f.user_id,
                UserChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(matches!(
            f.authorizer.authenticate(Some(&header(&access))).await,
            Err(WardenError::Forbidden(_))
        ));

        f.store.delete_user(f.user_id).await.unwrap();
        assert!(matches!(
            f.authorizer.authenticate(Some(&header(&access))).await,
            Err(WardenError::Unauthenticated(AuthFailure::UnknownSubject))
        ));
    }
}
