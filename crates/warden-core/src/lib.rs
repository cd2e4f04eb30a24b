//! Warden: password authentication, signed tokens with revocation, password
//! reset and role-based access control for axum services.

pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod db;
pub mod error;
pub mod extractors;
pub mod logging;
pub mod mail;
pub mod migrations;
pub mod models;
pub mod response;
pub mod store;
pub mod testing;

pub use app::App;
pub use config::Config;
pub use error::WardenError;

pub mod prelude {
    pub use crate::app::{API_PREFIX, App, build_router};
    pub use crate::auth::{
        Authorizer, CredentialService, PasswordResetFlow, Principal, RbacService, TokenKind,
        TokenService,
    };
    pub use crate::config::Config;
    pub use crate::controllers::AppState;
    pub use crate::error::WardenError;
    pub use crate::extractors::{AuthUser, Json};
    pub use crate::logging::{init_logging, init_logging_json, init_logging_with_level};
    pub use crate::response::ApiResponse;
}
