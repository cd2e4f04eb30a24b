//! Accounts: registration, login, logout and admin user management.

use std::sync::Arc;

use serde::Deserialize;
use validator::Validate;

use super::password::{check_length, hash_password_async, verify_password_async};
use super::rbac::RbacService;
use super::tokens::{TokenPair, TokenService};
use crate::clock::SharedClock;
use crate::error::WardenError;
use crate::store::{CredentialStore, NewUser, SharedStore, StoreError, User, UserChanges};

/// Self-service sign-up request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAccount {
    #[validate(length(min = 3, max = 80, message = "must be 3-80 characters"))]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub password: String,
}

/// Admin changes to a user. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UserUpdate {
    #[validate(length(min = 3, max = 80, message = "must be 3-80 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct CredentialService {
    inner: Arc<CredentialInner>,
}

struct CredentialInner {
    store: SharedStore,
    tokens: TokenService,
    rbac: RbacService,
    clock: SharedClock,
    min_password_length: u64,
}

fn duplicate_account(err: StoreError) -> WardenError {
    match err {
        StoreError::Conflict(_) => {
            WardenError::Conflict("Username or email already exists".to_string())
        }
        other => other.into(),
    }
}

impl CredentialService {
    pub fn new(
        store: SharedStore,
        tokens: TokenService,
        rbac: RbacService,
        clock: SharedClock,
        min_password_length: u64,
    ) -> Self {
        Self {
            inner: Arc::new(CredentialInner {
                store,
                tokens,
                rbac,
                clock,
                min_password_length,
            }),
        }
    }

    /// Reject passwords shorter than the configured minimum.
    pub fn check_password(&self, password: &str) -> Result<(), WardenError> {
        check_length("password", password, self.inner.min_password_length)
    }

    async fn ensure_unclaimed(&self, username: &str, email: &str) -> Result<(), WardenError> {
        let store = &self.inner.store;
        if store.user_by_username(username).await?.is_some()
            || store.user_by_email(email).await?.is_some()
        {
            return Err(WardenError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }
        Ok(())
    }

    async fn insert_account(
        &self,
        account: NewAccount,
        is_active: bool,
    ) -> Result<User, WardenError> {
        account.validate()?;
        self.check_password(&account.password)?;
        self.ensure_unclaimed(&account.username, &account.email)
            .await?;

        let password_hash = hash_password_async(account.password).await?;
        self.inner
            .store
            .insert_user(
                NewUser {
                    username: account.username,
                    email: account.email,
                    password_hash,
                    is_active,
                },
                self.inner.clock.now(),
            )
            .await
            .map_err(duplicate_account)
    }

    /// Create an active account and log it in.
    pub async fn register(&self, account: NewAccount) -> Result<(User, TokenPair), WardenError> {
        let user = self.insert_account(account, true).await?;
        let tokens = self.inner.tokens.issue_pair(user.id)?;
        tracing::info!(user_id = user.id, username = %user.username, "user registered");
        Ok((user, tokens))
    }

    /// Check credentials and issue a token pair.
    ///
    /// Unknown email and wrong password are indistinguishable.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), WardenError> {
        let Some(user) = self.inner.store.user_by_email(email).await? else {
            tracing::warn!("login failed: unknown email");
            return Err(WardenError::InvalidCredentials);
        };

        if !verify_password_async(password.to_string(), user.password_hash.clone()).await? {
            tracing::warn!(user_id = user.id, "login failed: wrong password");
            return Err(WardenError::InvalidCredentials);
        }

        if !user.is_active {
            tracing::warn!(user_id = user.id, "login refused: account deactivated");
            return Err(WardenError::Forbidden("Account is deactivated".to_string()));
        }

        let tokens = self.inner.tokens.issue_pair(user.id)?;
        tracing::info!(user_id = user.id, "user logged in");
        Ok((user, tokens))
    }

    /// Revoke the presented token.
    pub async fn logout(&self, token: &str) -> Result<(), WardenError> {
        self.inner.tokens.revoke(token).await?;
        Ok(())
    }

    pub async fn get_user(&self, id: i32) -> Result<User, WardenError> {
        self.inner
            .store
            .user_by_id(id)
            .await?
            .ok_or_else(|| WardenError::NotFound("User not found".to_string()))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, WardenError> {
        Ok(self.inner.store.list_users().await?)
    }

    /// Admin-side account creation; issues no tokens.
    pub async fn create_user(
        &self,
        account: NewAccount,
        is_active: bool,
    ) -> Result<User, WardenError> {
        let user = self.insert_account(account, is_active).await?;
        tracing::info!(user_id = user.id, "user created");
        Ok(user)
    }

    pub async fn update_user(&self, id: i32, update: UserUpdate) -> Result<User, WardenError> {
        update.validate()?;

        let password_hash = match update.password {
            Some(password) => {
                self.check_password(&password)?;
                Some(hash_password_async(password).await?)
            }
            None => None,
        };

        let changes = UserChanges {
            username: update.username,
            email: update.email,
            password_hash,
            is_active: update.is_active,
        };

        let user = self
            .inner
            .store
            .update_user(id, changes, self.inner.clock.now())
            .await
            .map_err(duplicate_account)?
            .ok_or_else(|| WardenError::NotFound("User not found".to_string()))?;
        tracing::info!(user_id = user.id, "user updated");
        Ok(user)
    }

    /// Delete a user; its role assignments go with it and its tokens stop
    /// validating at the middleware, which requires the subject to exist.
    pub async fn delete_user(&self, id: i32) -> Result<(), WardenError> {
        if !self.inner.store.delete_user(id).await? {
            return Err(WardenError::NotFound("User not found".to_string()));
        }
        self.inner.rbac.invalidate_all().await;
        tracing::info!(user_id = id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::auth::jwt::TokenKind;
    use crate::auth::tokens::TokenError;
    use crate::clock::ManualClock;
    use crate::config::{RbacConfig, TokenConfig};
    use crate::store::MemoryStore;

    fn service() -> (CredentialService, TokenService) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let clock: SharedClock = Arc::new(ManualClock::new(Utc::now()));
        let tokens = TokenService::new(TokenConfig::new("cred-secret"), store.clone(), clock.clone());
        let rbac = RbacService::new(&RbacConfig::default(), store.clone(), clock.clone());
        (
            CredentialService::new(store, tokens.clone(), rbac, clock, 8),
            tokens,
        )
    }

    fn alice() -> NewAccount {
        NewAccount {
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password: "pw123456".to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_login_same_user() {
        let (creds, tokens) = service();
        let (registered, pair) = creds.register(alice()).await.unwrap();
        tokens
            .validate(&pair.access_token, TokenKind::Access)
            .await
            .unwrap();

        let (logged_in, _) = creds.login("alice@x.com", "pw123456").await.unwrap();
        assert_eq!(registered.id, logged_in.id);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts_without_a_new_row() {
        let (creds, _) = service();
        creds.register(alice()).await.unwrap();

        let mut same_name = alice();
        same_name.email = "other@x.com".to_string();
        assert!(matches!(
            creds.register(same_name).await,
            Err(WardenError::Conflict(_))
        ));

        let mut same_email = alice();
        same_email.username = "alice2".to_string();
        assert!(matches!(
            creds.register(same_email).await,
            Err(WardenError::Conflict(_))
        ));

        assert_eq!(creds.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_credentials_look_the_same() {
        let (creds, _) = service();
        creds.register(alice()).await.unwrap();

        assert!(matches!(
            creds.login("alice@x.com", "wrong-pass").await,
            Err(WardenError::InvalidCredentials)
        ));
        assert!(matches!(
            creds.login("nobody@x.com", "pw123456").await,
            Err(WardenError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn deactivated_accounts_cannot_log_in() {
        let (creds, _) = service();
        let (user, _) = creds.register(alice()).await.unwrap();
        creds
            .update_user(
                user.id,
                UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            creds.login("alice@x.com", "pw123456").await,
            Err(WardenError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn short_passwords_are_rejected() {
        let (creds, _) = service();
        let mut account = alice();
        account.password = "short".to_string();
        assert!(matches!(
            creds.register(account).await,
            Err(WardenError::ValidationErrors(_))
        ));
    }

    #[tokio::test]
    async fn logout_revokes_the_token() {
        let (creds, tokens) = service();
        let (_, pair) = creds.register(alice()).await.unwrap();
        creds.logout(&pair.access_token).await.unwrap();
        assert!(matches!(
            tokens.validate(&pair.access_token, TokenKind::Access).await,
            Err(TokenError::Revoked)
        ));
    }
}
