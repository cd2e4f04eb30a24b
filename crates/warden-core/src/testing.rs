//! Integration-test harness: a real server on an ephemeral port backed by
//! in-memory SQLite, plus mail doubles.
//!
//! ```rust,ignore
//! #[tokio::test]
//! async fn register_works() {
//!     let app = TestApp::new().await;
//!     let res = app
//!         .client
//!         .post(&app.url("/api/v1/auth/register"), r#"{"username":"bob","email":"b@x.com","password":"secret123"}"#)
//!         .await;
//!     assert_eq!(res.status, 201);
//! }
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use tokio::net::TcpListener;

use crate::app::App;
use crate::auth::NewGrantable;
use crate::clock::ManualClock;
use crate::config::Config;
use crate::controllers::AppState;
use crate::mail::{DeliveryFailed, Email, Mailer};

/// Mailer that keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The token at the end of the reset link in the latest message.
    pub fn last_reset_token(&self) -> Option<String> {
        let last = self.sent().pop()?;
        let marker = "/auth/reset-password/";
        let start = last.body.find(marker)? + marker.len();
        last.body[start..]
            .split_whitespace()
            .next()
            .map(str::to_string)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), DeliveryFailed> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(email);
        Ok(())
    }
}

/// Mailer whose transport is always down.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, email: Email) -> Result<(), DeliveryFailed> {
        Err(DeliveryFailed {
            to: email.to,
            reason: "connection refused".to_string(),
        })
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: TestClient,
    pub db: DatabaseConnection,
    pub config: Config,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    /// Drives token expiry for the running server.
    pub clock: ManualClock,
}

impl TestApp {
    /// Start a server with a recording mailer and a manual clock.
    pub async fn new() -> Self {
        let mailer = Arc::new(RecordingMailer::new());
        Self::start(mailer.clone(), mailer).await
    }

    /// Start a server whose mail transport always fails.
    pub async fn with_failing_mailer() -> Self {
        Self::start(Arc::new(FailingMailer), Arc::new(RecordingMailer::new())).await
    }

    async fn start(mailer: Arc<dyn Mailer>, recorder: Arc<RecordingMailer>) -> Self {
        let clock = ManualClock::starting_now();
        let app = App::with_parts(Config::for_tests(), mailer, Arc::new(clock.clone()))
            .await
            .expect("Failed to create test app");

        let router = app.router();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server failed");
        });

        TestApp {
            addr,
            client: TestClient::new(addr),
            db: app.db,
            config: app.config,
            state: app.state,
            mailer: recorder,
            clock,
        }
    }

    /// Full URL for a path on the test server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Register through the API; returns (access token, refresh token, user).
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> (String, String, serde_json::Value) {
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "password": password,
        });
        let res = self
            .client
            .post(&self.url("/api/v1/auth/register"), &body.to_string())
            .await;
        assert_eq!(res.status, 201, "Register failed: {}", res.body);

        let data = res.data();
        (
            data["access_token"].as_str().unwrap().to_string(),
            data["refresh_token"].as_str().unwrap().to_string(),
            data["user"].clone(),
        )
    }

    /// Login through the API and return the access token.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let body = serde_json::json!({ "email": email, "password": password });
        let res = self
            .client
            .post(&self.url("/api/v1/auth/login"), &body.to_string())
            .await;
        assert_eq!(res.status, 200, "Login failed: {}", res.body);
        res.data()["access_token"].as_str().unwrap().to_string()
    }

    /// Give `user_id` access to each endpoint name, mapping unmapped ones to
    /// a fresh permission.
    pub async fn grant(&self, user_id: i32, endpoints: &[&str]) {
        let rbac = &self.state.rbac;
        let role = rbac
            .create_role(NewGrantable {
                name: format!("grant-{}", uuid::Uuid::new_v4()),
                description: None,
            })
            .await
            .expect("create role");

        for endpoint in endpoints {
            let existing = rbac
                .list_endpoints()
                .await
                .expect("list endpoints")
                .into_iter()
                .find(|e| e.endpoint_name == *endpoint);
            let permission_id = match existing {
                Some(mapping) => mapping.permission_id,
                None => {
                    let perm = rbac
                        .create_permission(NewGrantable {
                            name: endpoint.to_string(),
                            description: None,
                        })
                        .await
                        .expect("create permission");
                    rbac.map_endpoint(endpoint, perm.id)
                        .await
                        .expect("map endpoint");
                    perm.id
                }
            };
            rbac.assign_permission(role.id, permission_id)
                .await
                .expect("grant permission");
        }

        rbac.assign_role(user_id, role.id)
            .await
            .expect("assign role");
    }

    pub fn now(&self) -> DateTime<Utc> {
        use crate::clock::Clock;
        self.clock.now()
    }
}

/// A simple HTTP test client with helper methods.
#[derive(Clone)]
pub struct TestClient {
    inner: reqwest::Client,
    base_addr: SocketAddr,
}

impl TestClient {
    pub fn new(addr: SocketAddr) -> Self {
        TestClient {
            inner: reqwest::Client::new(),
            base_addr: addr,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> TestResponse {
        let res = req.send().await.expect("request failed");
        TestResponse::from_response(res).await
    }

    fn with_auth(req: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {}", token))
    }

    fn with_json(req: reqwest::RequestBuilder, body: &str) -> reqwest::RequestBuilder {
        req.header("Content-Type", "application/json")
            .body(body.to_string())
    }

    pub async fn get(&self, url: &str) -> TestResponse {
        self.send(self.inner.get(url)).await
    }

    pub async fn get_with_auth(&self, url: &str, token: &str) -> TestResponse {
        self.send(Self::with_auth(self.inner.get(url), token)).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post(&self, url: &str, body: &str) -> TestResponse {
        self.send(Self::with_json(self.inner.post(url), body)).await
    }

    pub async fn post_with_auth(&self, url: &str, token: &str, body: &str) -> TestResponse {
        self.send(Self::with_auth(
            Self::with_json(self.inner.post(url), body),
            token,
        ))
        .await
    }

    pub async fn put_with_auth(&self, url: &str, token: &str, body: &str) -> TestResponse {
        self.send(Self::with_auth(
            Self::with_json(self.inner.put(url), body),
            token,
        ))
        .await
    }

    pub async fn delete_with_auth(&self, url: &str, token: &str) -> TestResponse {
        self.send(Self::with_auth(self.inner.delete(url), token))
            .await
    }

    /// DELETE with a JSON body, as the association endpoints expect.
    pub async fn delete_json_with_auth(&self, url: &str, token: &str, body: &str) -> TestResponse {
        self.send(Self::with_auth(
            Self::with_json(self.inner.delete(url), body),
            token,
        ))
        .await
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.base_addr)
    }
}

/// A simplified HTTP response for test assertions.
#[derive(Debug)]
pub struct TestResponse {
    pub status: u16,
    pub body: String,
    pub headers: HeaderMap,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let mut headers = HeaderMap::new();
        for (name, value) in res.headers() {
            if let (Ok(name), Ok(value)) = (
                axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
                axum::http::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }
        let body = res.text().await.unwrap_or_default();
        TestResponse {
            status,
            body,
            headers,
        }
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("Failed to parse response as JSON")
    }

    pub fn is_success(&self) -> bool {
        self.json()["success"].as_bool().unwrap_or(false)
    }

    pub fn data(&self) -> serde_json::Value {
        self.json()["data"].clone()
    }

    pub fn error(&self) -> serde_json::Value {
        self.json()["error"].clone()
    }
}
