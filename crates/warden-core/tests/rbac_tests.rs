use warden_core::testing::TestApp;

fn user_id(user: &serde_json::Value) -> i32 {
    user["id"].as_i64().unwrap() as i32
}

#[tokio::test]
async fn test_admin_routes_deny_without_mapping() {
    let app = TestApp::new().await;
    let (access, _, _) = app.register("alice", "alice@x.com", "pw123456").await;

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/roles"), &access)
        .await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error()["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_admin_routes_need_a_token_first() {
    let app = TestApp::new().await;

    let res = app.client.get(&app.url("/api/v1/roles")).await;
    assert_eq!(res.status, 401);

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/roles"), "garbage")
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error()["message"], "Invalid or expired token");
}

#[tokio::test]
async fn test_granted_endpoint_is_admitted() {
    let app = TestApp::new().await;
    let (access, _, user) = app.register("alice", "alice@x.com", "pw123456").await;
    app.grant(user_id(&user), &["GET /api/v1/roles"]).await;

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/roles"), &access)
        .await;
    assert_eq!(res.status, 200);

    // a different method on the same path is a different endpoint
    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/roles"), &access, r#"{"name":"x"}"#)
        .await;
    assert_eq!(res.status, 403);
}

#[tokio::test]
async fn test_path_parameters_match_the_route_template() {
    let app = TestApp::new().await;
    let (access, _, user) = app.register("alice", "alice@x.com", "pw123456").await;
    app.grant(user_id(&user), &["GET /api/v1/users/{id}"]).await;

    let res = app
        .client
        .get_with_auth(
            &app.url(&format!("/api/v1/users/{}", user_id(&user))),
            &access,
        )
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.data()["username"], "alice");
}

#[tokio::test]
async fn test_editor_publish_scenario_over_http() {
    let app = TestApp::new().await;
    let (admin_token, _, admin) = app.register("admin", "admin@x.com", "pw123456").await;
    app.grant(
        user_id(&admin),
        &[
            "POST /api/v1/roles",
            "POST /api/v1/permissions",
            "POST /api/v1/user-roles",
            "POST /api/v1/role-permissions",
            "POST /api/v1/endpoint-permissions",
            "DELETE /api/v1/user-roles",
        ],
    )
    .await;

    let (editor_token, _, editor) = app.register("ed", "ed@x.com", "pw123456").await;
    let (other_token, _, _) = app.register("other", "other@x.com", "pw123456").await;

    let role = app
        .client
        .post_with_auth(
            &app.url("/api/v1/roles"),
            &admin_token,
            r#"{"name":"editor"}"#,
        )
        .await;
    assert_eq!(role.status, 201);
    let role_id = role.data()["id"].as_i64().unwrap();

    let perm = app
        .client
        .post_with_auth(
            &app.url("/api/v1/permissions"),
            &admin_token,
            r#"{"name":"publish","description":"publish articles"}"#,
        )
        .await;
    assert_eq!(perm.status, 201);
    let perm_id = perm.data()["id"].as_i64().unwrap();

    let assign = serde_json::json!({ "user_id": user_id(&editor), "role_id": role_id }).to_string();
    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/user-roles"), &admin_token, &assign)
        .await;
    assert_eq!(res.status, 201);

    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/user-roles"), &admin_token, &assign)
        .await;
    assert_eq!(res.status, 409);

    let grant = serde_json::json!({ "role_id": role_id, "permission_id": perm_id }).to_string();
    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/role-permissions"), &admin_token, &grant)
        .await;
    assert_eq!(res.status, 201);

    let map = serde_json::json!({
        "endpoint_name": "GET /api/v1/users",
        "permission_id": perm_id
    })
    .to_string();
    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/endpoint-permissions"), &admin_token, &map)
        .await;
    assert_eq!(res.status, 201);

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/users"), &editor_token)
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.data().as_array().unwrap().len(), 3);

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/users"), &other_token)
        .await;
    assert_eq!(res.status, 403);

    let res = app
        .client
        .delete_json_with_auth(&app.url("/api/v1/user-roles"), &admin_token, &assign)
        .await;
    assert_eq!(res.status, 200);

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/users"), &editor_token)
        .await;
    assert_eq!(res.status, 403);
}

#[tokio::test]
async fn test_mapping_unknown_permission_is_422() {
    let app = TestApp::new().await;
    let (token, _, user) = app.register("admin", "admin@x.com", "pw123456").await;
    app.grant(user_id(&user), &["POST /api/v1/endpoint-permissions"])
        .await;

    let body = r#"{"endpoint_name":"GET /api/v1/anything","permission_id":9999}"#;
    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/endpoint-permissions"), &token, body)
        .await;
    assert_eq!(res.status, 422);
    assert_eq!(res.error()["code"], "INVALID_PERMISSION");
}

#[tokio::test]
async fn test_update_rejects_unknown_fields() {
    let app = TestApp::new().await;
    let (token, _, user) = app.register("admin", "admin@x.com", "pw123456").await;
    app.grant(user_id(&user), &["PUT /api/v1/users/{id}"]).await;

    let res = app
        .client
        .put_with_auth(
            &app.url(&format!("/api/v1/users/{}", user_id(&user))),
            &token,
            r#"{"password_hash":"x"}"#,
        )
        .await;
    assert_eq!(res.status, 422);

    let res = app
        .client
        .put_with_auth(
            &app.url(&format!("/api/v1/users/{}", user_id(&user))),
            &token,
            r#"{"username":"alice2"}"#,
        )
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.data()["username"], "alice2");
}

#[tokio::test]
async fn test_deleted_user_token_stops_working() {
    let app = TestApp::new().await;
    let (admin_token, _, admin) = app.register("admin", "admin@x.com", "pw123456").await;
    app.grant(user_id(&admin), &["DELETE /api/v1/users/{id}"])
        .await;
    let (victim_token, _, victim) = app.register("bob", "bob@x.com", "pw123456").await;

    let res = app
        .client
        .delete_with_auth(
            &app.url(&format!("/api/v1/users/{}", user_id(&victim))),
            &admin_token,
        )
        .await;
    assert_eq!(res.status, 200);

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/auth/me"), &victim_token)
        .await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_mapped_permission_delete_conflicts() {
    let app = TestApp::new().await;
    let (token, _, user) = app.register("admin", "admin@x.com", "pw123456").await;
    app.grant(user_id(&user), &["DELETE /api/v1/permissions/{id}"])
        .await;

    let mapping = app
        .state
        .rbac
        .list_endpoints()
        .await
        .unwrap()
        .into_iter()
        .find(|e| e.endpoint_name == "DELETE /api/v1/permissions/{id}")
        .unwrap();

    let res = app
        .client
        .delete_with_auth(
            &app.url(&format!("/api/v1/permissions/{}", mapping.permission_id)),
            &token,
        )
        .await;
    assert_eq!(res.status, 409);
}
