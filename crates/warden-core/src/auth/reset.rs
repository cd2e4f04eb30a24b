//! Forgotten-password flow: mail a one-hour reset link, then accept a new
//! password against the token in that link.

use std::sync::Arc;

use super::jwt::TokenKind;
use super::password::{check_length, hash_password_async};
use super::tokens::{TokenError, TokenService};
use crate::clock::SharedClock;
use crate::config::ResetConfig;
use crate::error::WardenError;
use crate::mail::{Email, Mailer};
use crate::store::{CredentialStore, SharedStore, User, UserChanges};

pub const RESET_SUBJECT: &str = "Password Reset Request";

#[derive(Clone)]
pub struct PasswordResetFlow {
    inner: Arc<ResetInner>,
}

struct ResetInner {
    config: ResetConfig,
    store: SharedStore,
    tokens: TokenService,
    mailer: Arc<dyn Mailer>,
    clock: SharedClock,
    min_password_length: u64,
}

impl PasswordResetFlow {
    pub fn new(
        config: ResetConfig,
        store: SharedStore,
        tokens: TokenService,
        mailer: Arc<dyn Mailer>,
        clock: SharedClock,
        min_password_length: u64,
    ) -> Self {
        Self {
            inner: Arc::new(ResetInner {
                config,
                store,
                tokens,
                mailer,
                clock,
                min_password_length,
            }),
        }
    }

    /// Link mailed to the user.
    pub fn reset_url(&self, token: &str) -> String {
        format!(
            "{}/auth/reset-password/{}",
            self.inner.config.base_server_url.trim_end_matches('/'),
            token
        )
    }

    fn reset_email(&self, user: &User, token: &str) -> Email {
        let body = format!(
            "Hello {},\n\n\
             You requested a password reset. Click the link below to reset your password:\n\n\
             {}\n\n\
             This link will expire in 1 hour.\n\n\
             If you did not request a password reset, please ignore this email.\n",
            user.username,
            self.reset_url(token)
        );
        Email {
            from: self.inner.config.mail_from.clone(),
            to: user.email.clone(),
            subject: RESET_SUBJECT.to_string(),
            body,
        }
    }

    /// Start a reset for `email`.
    ///
    /// Succeeds whether or not an account exists for the address. A transport
    /// failure surfaces as `DeliveryFailed`.
    pub async fn initiate(&self, email: &str) -> Result<(), WardenError> {
        let Some(user) = self.inner.store.user_by_email(email).await? else {
            tracing::info!("password reset requested for unknown address");
            return Ok(());
        };

        let token = self.inner.tokens.issue(user.id, TokenKind::Reset)?;
        self.inner
            .mailer
            .send(self.reset_email(&user, &token))
            .await
            .map_err(|e| {
                tracing::error!(user_id = user.id, error = %e, "reset email not delivered");
                WardenError::DeliveryFailed(e.to_string())
            })?;

        tracing::info!(user_id = user.id, "password reset email sent");
        Ok(())
    }

    /// Validate a reset token without consuming it and return the frontend
    /// page that collects the new password.
    pub async fn check(&self, reset_token: &str) -> Result<String, WardenError> {
        self.inner
            .tokens
            .validate(reset_token, TokenKind::Reset)
            .await?;
        Ok(format!(
            "{}/reset-password?token={}",
            self.inner.config.frontend_url.trim_end_matches('/'),
            reset_token
        ))
    }

    /// Replace the password of the token's subject.
    ///
    /// The reset token is spent before the password is written, so a token
    /// changes the password at most once. A rejected password leaves it
    /// unspent. Other sessions of the user stay valid.
    pub async fn complete(&self, reset_token: &str, new_password: &str) -> Result<User, WardenError> {
        let tokens = &self.inner.tokens;
        tokens.validate(reset_token, TokenKind::Reset).await?;
        check_length("new_password", new_password, self.inner.min_password_length)?;

        let claims = tokens.consume(reset_token, TokenKind::Reset).await?;
        let user_id = claims.user_id().ok_or(TokenError::Malformed)?;

        let password_hash = hash_password_async(new_password.to_string()).await?;
        let user = self
            .inner
            .store
            .update_user(
                user_id,
                UserChanges {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
                self.inner.clock.now(),
            )
            .await?
            .ok_or_else(|| WardenError::NotFound("User not found".to_string()))?;

        tracing::info!(user_id = user.id, "password reset completed");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::auth::password::verify_password;
    use crate::clock::ManualClock;
    use crate::config::TokenConfig;
    use crate::store::{MemoryStore, NewUser};
    use crate::testing::{FailingMailer, RecordingMailer};

    struct Fixture {
        flow: PasswordResetFlow,
        store: SharedStore,
        clock: ManualClock,
    }

    async fn fixture(mailer: Arc<dyn Mailer>) -> Fixture {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let clock = ManualClock::starting_now();
        let shared_clock: SharedClock = Arc::new(clock.clone());
        store
            .insert_user(
                NewUser {
                    username: "alice".to_string(),
                    email: "alice@x.com".to_string(),
                    password_hash: crate::auth::password::hash_password("pw123456").unwrap(),
                    is_active: true,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let tokens = TokenService::new(
            TokenConfig::new("reset-secret"),
            store.clone(),
            shared_clock.clone(),
        );
        let flow = PasswordResetFlow::new(
            ResetConfig::default(),
            store.clone(),
            tokens,
            mailer,
            shared_clock,
            8,
        );
        Fixture { flow, store, clock }
    }

    fn token_from(body: &str) -> String {
        let marker = "/auth/reset-password/";
        let start = body.find(marker).unwrap() + marker.len();
        body[start..].split_whitespace().next().unwrap().to_string()
    }

    #[tokio::test]
    async fn unknown_address_succeeds_silently() {
        let mailer = Arc::new(RecordingMailer::new());
        let f = fixture(mailer.clone()).await;
        f.flow.initiate("nobody@x.com").await.unwrap();
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn mail_greets_user_and_links_reset() {
        let mailer = Arc::new(RecordingMailer::new());
        let f = fixture(mailer.clone()).await;
        f.flow.initiate("alice@x.com").await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@x.com");
        assert_eq!(sent[0].subject, RESET_SUBJECT);
        assert!(sent[0].body.contains("Hello alice"));
        assert!(sent[0].body.contains("1 hour"));
        assert!(
            sent[0]
                .body
                .contains("http://localhost:5000/api/v1/auth/reset-password/")
        );
    }

    #[tokio::test]
    async fn transport_failure_is_reported_for_known_address() {
        let f = fixture(Arc::new(FailingMailer)).await;
        assert!(matches!(
            f.flow.initiate("alice@x.com").await,
            Err(WardenError::DeliveryFailed(_))
        ));
    }

    #[tokio::test]
    async fn complete_changes_password_once() {
        let mailer = Arc::new(RecordingMailer::new());
        let f = fixture(mailer.clone()).await;
        f.flow.initiate("alice@x.com").await.unwrap();
        let token = token_from(&mailer.sent()[0].body);

        assert!(
            f.flow
                .check(&token)
                .await
                .unwrap()
                .starts_with("http://localhost:3000/reset-password?token=")
        );

        let user = f.flow.complete(&token, "newpw123").await.unwrap();
        assert!(verify_password("newpw123", &user.password_hash).unwrap());
        assert!(!verify_password("pw123456", &user.password_hash).unwrap());

        assert!(matches!(
            f.flow.complete(&token, "another123").await,
            Err(WardenError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn reset_tokens_expire_after_an_hour() {
        let mailer = Arc::new(RecordingMailer::new());
        let f = fixture(mailer.clone()).await;
        f.flow.initiate("alice@x.com").await.unwrap();
        let token = token_from(&mailer.sent()[0].body);

        f.clock.advance(Duration::minutes(61));
        assert!(matches!(
            f.flow.complete(&token, "newpw123").await,
            Err(WardenError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn deleted_subject_is_not_found() {
        let mailer = Arc::new(RecordingMailer::new());
        let f = fixture(mailer.clone()).await;
        f.flow.initiate("alice@x.com").await.unwrap();
        let token = token_from(&mailer.sent()[0].body);

        let user = f.store.user_by_email("alice@x.com").await.unwrap().unwrap();
        f.store.delete_user(user.id).await.unwrap();
        assert!(matches!(
            f.flow.complete(&token, "newpw123").await,
            Err(WardenError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions_spend_the_token_once() {
        let mailer = Arc::new(RecordingMailer::new());
        let f = fixture(mailer.clone()).await;
        f.flow.initiate("alice@x.com").await.unwrap();
        let token = token_from(&mailer.sent()[0].body);

        let (first, second) = tokio::join!(
            f.flow.complete(&token, "first-pw-1"),
            f.flow.complete(&token, "second-pw-2")
        );
        assert_eq!(
            first.is_ok() as u8 + second.is_ok() as u8,
            1,
            "one reset token changed the password twice"
        );

        let winner = if first.is_ok() { "first-pw-1" } else { "second-pw-2" };
        let user = f.store.user_by_email("alice@x.com").await.unwrap().unwrap();
        assert!(verify_password(winner, &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn rejected_password_leaves_token_unspent() {
        let mailer = Arc::new(RecordingMailer::new());
        let f = fixture(mailer.clone()).await;
        f.flow.initiate("alice@x.com").await.unwrap();
        let token = token_from(&mailer.sent()[0].body);

        assert!(matches!(
            f.flow.complete(&token, "short").await,
            Err(WardenError::ValidationErrors(_))
        ));
        f.flow.complete(&token, "long-enough-1").await.unwrap();
    }
}
