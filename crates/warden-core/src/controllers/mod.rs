use std::sync::Arc;

use crate::auth::{Authorizer, CredentialService, PasswordResetFlow, RbacService, TokenService};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::mail::Mailer;
use crate::store::SharedStore;

/// Shared application state available in all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: SharedStore,
    pub tokens: TokenService,
    pub rbac: RbacService,
    pub credentials: CredentialService,
    pub reset: PasswordResetFlow,
    pub authorizer: Authorizer,
}

impl AppState {
    /// Wire every service over one store, mailer and clock.
    pub fn new(
        config: Config,
        store: SharedStore,
        mailer: Arc<dyn Mailer>,
        clock: SharedClock,
    ) -> Self {
        let tokens = TokenService::new(config.token.clone(), store.clone(), clock.clone());
        let rbac = RbacService::new(&config.rbac, store.clone(), clock.clone());
        let credentials = CredentialService::new(
            store.clone(),
            tokens.clone(),
            rbac.clone(),
            clock.clone(),
            config.min_password_length,
        );
        let reset = PasswordResetFlow::new(
            config.reset.clone(),
            store.clone(),
            tokens.clone(),
            mailer,
            clock,
            config.min_password_length,
        );
        let authorizer = Authorizer::new(tokens.clone(), rbac.clone(), store.clone());

        AppState {
            config: Arc::new(config),
            store,
            tokens,
            rbac,
            credentials,
            reset,
            authorizer,
        }
    }
}

pub mod auth;
pub mod rbac;
pub mod users;
