use chrono::Duration;
use warden_core::testing::TestApp;

#[tokio::test]
async fn test_register_returns_tokens_and_user() {
    let app = TestApp::new().await;

    let body = serde_json::json!({
        "username": "alice",
        "email": "alice@x.com",
        "password": "pw123456"
    });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/register"), &body.to_string())
        .await;

    assert_eq!(res.status, 201);
    assert!(res.is_success());
    let data = res.data();
    assert!(data["access_token"].is_string());
    assert!(data["refresh_token"].is_string());
    assert_eq!(data["user"]["username"], "alice");
    assert_eq!(data["user"]["email"], "alice@x.com");
    assert_eq!(data["user"]["is_active"], true);
    assert!(data["user"]["password_hash"].is_null());
}

#[tokio::test]
async fn test_register_then_login_same_user() {
    let app = TestApp::new().await;
    let (_, _, user) = app.register("alice", "alice@x.com", "pw123456").await;

    let body = serde_json::json!({ "email": "alice@x.com", "password": "pw123456" });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/login"), &body.to_string())
        .await;

    assert_eq!(res.status, 200);
    assert_eq!(res.data()["user"]["id"], user["id"]);
}

#[tokio::test]
async fn test_register_duplicate_username_or_email() {
    let app = TestApp::new().await;
    app.register("alice", "alice@x.com", "pw123456").await;

    for (username, email) in [("alice", "other@x.com"), ("other", "alice@x.com")] {
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "password": "pw123456"
        });
        let res = app
            .client
            .post(&app.url("/api/v1/auth/register"), &body.to_string())
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.error()["code"], "CONFLICT");
    }
}

#[tokio::test]
async fn test_register_invalid_input_is_422() {
    let app = TestApp::new().await;

    let body = serde_json::json!({
        "username": "al",
        "email": "not-an-email",
        "password": "pw123456"
    });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/register"), &body.to_string())
        .await;

    assert_eq!(res.status, 422);
    let fields: Vec<String> = res.error()["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap().to_string())
        .collect();
    assert!(fields.contains(&"email".to_string()));
    assert!(fields.contains(&"username".to_string()));
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = TestApp::new().await;
    app.register("alice", "alice@x.com", "pw123456").await;

    let body = serde_json::json!({ "email": "alice@x.com", "password": "wrongpass" });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/login"), &body.to_string())
        .await;

    assert_eq!(res.status, 401);
    assert!(!res.is_success());
}

#[tokio::test]
async fn test_me_requires_token() {
    let app = TestApp::new().await;
    let (access, _, user) = app.register("alice", "alice@x.com", "pw123456").await;

    let res = app.client.get(&app.url("/api/v1/auth/me")).await;
    assert_eq!(res.status, 401);

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/auth/me"), &access)
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.data()["id"], user["id"]);
}

#[tokio::test]
async fn test_refresh_issues_access_token_without_rotation() {
    let app = TestApp::new().await;
    let (_, refresh, _) = app.register("alice", "alice@x.com", "pw123456").await;
    let body = serde_json::json!({ "refresh_token": refresh }).to_string();

    let first = app
        .client
        .post(&app.url("/api/v1/auth/refresh"), &body)
        .await;
    assert_eq!(first.status, 200);
    let access = first.data()["access_token"].as_str().unwrap().to_string();

    let me = app
        .client
        .get_with_auth(&app.url("/api/v1/auth/me"), &access)
        .await;
    assert_eq!(me.status, 200);

    let second = app
        .client
        .post(&app.url("/api/v1/auth/refresh"), &body)
        .await;
    assert_eq!(second.status, 200);
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let app = TestApp::new().await;
    let (access, _, _) = app.register("alice", "alice@x.com", "pw123456").await;

    let body = serde_json::json!({ "refresh_token": access }).to_string();
    let res = app
        .client
        .post(&app.url("/api/v1/auth/refresh"), &body)
        .await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = TestApp::new().await;
    let (_, refresh, _) = app.register("alice", "alice@x.com", "pw123456").await;

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/auth/me"), &refresh)
        .await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_logout_revokes_access_token() {
    let app = TestApp::new().await;
    let (access, _, _) = app.register("alice", "alice@x.com", "pw123456").await;

    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/auth/logout"), &access, "{}")
        .await;
    assert_eq!(res.status, 200);

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/auth/me"), &access)
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error()["message"], "Invalid or expired token");
}

#[tokio::test]
async fn test_expired_access_token_is_rejected() {
    let app = TestApp::new().await;
    let (access, refresh, _) = app.register("alice", "alice@x.com", "pw123456").await;

    app.clock.advance(Duration::minutes(61));
    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/auth/me"), &access)
        .await;
    assert_eq!(res.status, 401);

    // the refresh token lives for 30 days
    let body = serde_json::json!({ "refresh_token": refresh }).to_string();
    let res = app
        .client
        .post(&app.url("/api/v1/auth/refresh"), &body)
        .await;
    assert_eq!(res.status, 200);
}

#[tokio::test]
async fn test_login_deactivated_account_is_403() {
    let app = TestApp::new().await;
    let (_, _, user) = app.register("alice", "alice@x.com", "pw123456").await;
    let id = user["id"].as_i64().unwrap() as i32;

    app.state
        .credentials
        .update_user(
            id,
            warden_core::auth::UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let body = serde_json::json!({ "email": "alice@x.com", "password": "pw123456" });
    let res = app
        .client
        .post(&app.url("/api/v1/auth/login"), &body.to_string())
        .await;
    assert_eq!(res.status, 403);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/health")).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.data()["status"], "ok");
    assert!(res.headers.contains_key("x-request-id"));
}
