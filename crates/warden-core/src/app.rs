use std::sync::Arc;

use axum::{Router, middleware::from_fn_with_state, routing::get};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

use crate::auth::middleware::{login_required, rbac_required};
use crate::clock::{self, SharedClock};
use crate::config::Config;
use crate::controllers::{self, AppState};
use crate::mail::{self, Mailer};
use crate::response::ApiResponse;
use crate::store::SeaStore;

pub const API_PREFIX: &str = "/api/v1";

/// A configured Warden server: database, services and router.
pub struct App {
    pub config: Config,
    pub db: DatabaseConnection,
    pub state: AppState,
}

impl App {
    /// Create a new app, loading config from environment.
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::from_env()?;
        Self::with_config(config).await
    }

    /// Connect, migrate and wire the configured mailer and system clock.
    pub async fn with_config(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let mailer = mail::from_config(&config.mail)?;
        Self::with_parts(config, mailer, clock::system()).await
    }

    /// Like [`App::with_config`] with an explicit mailer and clock.
    pub async fn with_parts(
        config: Config,
        mailer: Arc<dyn Mailer>,
        clock: SharedClock,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let db = crate::db::connect(&config).await?;
        crate::db::migrate(&db).await?;

        let store = Arc::new(SeaStore::new(db.clone()));
        let state = AppState::new(config.clone(), store, mailer, clock);

        Ok(App { config, db, state })
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.config.is_dev())
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.config.server_addr();
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Warden server running on http://{}", addr);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

/// Assemble the HTTP surface over `state`.
pub fn build_router(state: AppState, verbose_tracing: bool) -> Router {
    let session = controllers::auth::session_routes().route_layer(from_fn_with_state(
        state.authorizer.clone(),
        login_required,
    ));

    let admin = Router::new()
        .merge(controllers::users::routes())
        .merge(controllers::rbac::routes())
        .route_layer(from_fn_with_state(
            state.authorizer.clone(),
            rbac_required,
        ));

    let api = Router::new()
        .nest("/auth", controllers::auth::routes().merge(session))
        .merge(admin);

    let level = if verbose_tracing {
        tracing::Level::INFO
    } else {
        tracing::Level::DEBUG
    };
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(health))
        .nest(API_PREFIX, api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(level))
                .on_request(DefaultOnRequest::new().level(level))
                .on_response(
                    DefaultOnResponse::new()
                        .level(level)
                        .latency_unit(tower_http::LatencyUnit::Millis),
                ),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down Warden server...");
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> ApiResponse<Health> {
    ApiResponse::success(Health { status: "ok" })
}
