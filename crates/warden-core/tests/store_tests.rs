//! The sea-orm store against in-memory SQLite with real migrations.

use chrono::Utc;
use warden_core::config::Config;
use warden_core::store::{
    CredentialStore, NewRevocation, NewUser, RbacStore, RevocationStore, SeaStore, StoreError,
};

async fn store() -> SeaStore {
    let config = Config::for_tests();
    let db = warden_core::db::connect(&config).await.unwrap();
    warden_core::db::migrate(&db).await.unwrap();
    SeaStore::new(db)
}

fn new_user(name: &str) -> NewUser {
    NewUser {
        username: name.to_string(),
        email: format!("{name}@x.com"),
        password_hash: "hash".to_string(),
        is_active: true,
    }
}

#[tokio::test]
async fn test_unique_username_is_conflict() {
    let store = store().await;
    store.insert_user(new_user("alice"), Utc::now()).await.unwrap();

    let mut clash = new_user("alice");
    clash.email = "elsewhere@x.com".to_string();
    let err = store.insert_user(clash, Utc::now()).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_duplicate_association_is_conflict() {
    let store = store().await;
    let now = Utc::now();
    let user = store.insert_user(new_user("alice"), now).await.unwrap();
    let role = store.insert_role("editor", None, now).await.unwrap();

    store.insert_user_role(user.id, role.id, now).await.unwrap();
    let err = store
        .insert_user_role(user.id, role.id, now)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_effective_permissions_through_roles() {
    let store = store().await;
    let now = Utc::now();
    let user = store.insert_user(new_user("alice"), now).await.unwrap();
    let editor = store.insert_role("editor", None, now).await.unwrap();
    let reviewer = store.insert_role("reviewer", None, now).await.unwrap();
    let publish = store.insert_permission("publish", None, now).await.unwrap();
    let review = store.insert_permission("review", None, now).await.unwrap();

    store.insert_user_role(user.id, editor.id, now).await.unwrap();
    store.insert_user_role(user.id, reviewer.id, now).await.unwrap();
    store
        .insert_role_permission(editor.id, publish.id, now)
        .await
        .unwrap();
    store
        .insert_role_permission(reviewer.id, publish.id, now)
        .await
        .unwrap();
    store
        .insert_role_permission(reviewer.id, review.id, now)
        .await
        .unwrap();

    let names: Vec<String> = store
        .effective_permissions(user.id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["publish", "review"]);
}

#[tokio::test]
async fn test_delete_role_cascades() {
    let store = store().await;
    let now = Utc::now();
    let user = store.insert_user(new_user("alice"), now).await.unwrap();
    let role = store.insert_role("editor", None, now).await.unwrap();
    let perm = store.insert_permission("publish", None, now).await.unwrap();
    store.insert_user_role(user.id, role.id, now).await.unwrap();
    store
        .insert_role_permission(role.id, perm.id, now)
        .await
        .unwrap();

    assert!(store.delete_role(role.id).await.unwrap());
    assert!(store.list_user_roles().await.unwrap().is_empty());
    assert!(store.list_role_permissions().await.unwrap().is_empty());
    assert!(store.permission_by_id(perm.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_mapped_permission_delete_is_conflict() {
    let store = store().await;
    let now = Utc::now();
    let perm = store.insert_permission("publish", None, now).await.unwrap();
    store
        .insert_endpoint("POST /articles", perm.id, now)
        .await
        .unwrap();

    let err = store.delete_permission(perm.id).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_revocations_and_purge() {
    let store = store().await;
    let now = Utc::now();
    let user = store.insert_user(new_user("alice"), now).await.unwrap();

    let revocation = |jti: &str, hours: i64| NewRevocation {
        jti: jti.to_string(),
        token_type: "access".to_string(),
        user_id: user.id,
        revoked_at: now,
        expires_at: now + chrono::Duration::hours(hours),
    };

    store.insert_revocation(revocation("a", 1)).await.unwrap();
    store.insert_revocation(revocation("b", 48)).await.unwrap();
    assert!(matches!(
        store.insert_revocation(revocation("a", 1)).await,
        Err(StoreError::Conflict(_))
    ));
    assert!(store.is_revoked("a").await.unwrap());
    assert!(!store.is_revoked("c").await.unwrap());

    let purged = store
        .purge_revocations(now + chrono::Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(!store.is_revoked("a").await.unwrap());
    assert!(store.is_revoked("b").await.unwrap());
}

#[tokio::test]
async fn test_delete_user_keeps_revocations() {
    let store = store().await;
    let now = Utc::now();
    let user = store.insert_user(new_user("alice"), now).await.unwrap();
    let revocation = |jti: &str| NewRevocation {
        jti: jti.to_string(),
        token_type: "refresh".to_string(),
        user_id: user.id,
        revoked_at: now,
        expires_at: now + chrono::Duration::days(30),
    };
    store.insert_revocation(revocation("x")).await.unwrap();

    assert!(store.delete_user(user.id).await.unwrap());
    assert!(store.is_revoked("x").await.unwrap());
    assert!(!store.delete_user(user.id).await.unwrap());

    // a former user's id is still accepted
    store.insert_revocation(revocation("y")).await.unwrap();
    assert!(store.is_revoked("y").await.unwrap());
}
