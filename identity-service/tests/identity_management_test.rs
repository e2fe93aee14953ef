mod common;

use common::{meta, target, TestApp};
use identity_service::{
    models::{IdentityStatus, Scope},
    services::{AuthContext, IdentityUpdate, LoginProof, ServiceError},
    utils::Password,
};

async fn root_context(app: &TestApp) -> AuthContext {
    let root = app.super_admin("root@example.com").await;
    app.identity()
        .authorize(&root.tokens.access_token, Some(Scope::Admin))
        .await
        .unwrap()
}

fn status(status: IdentityStatus) -> IdentityUpdate {
    IdentityUpdate {
        status: Some(status),
        roles: None,
    }
}

fn roles(names: &[&str]) -> IdentityUpdate {
    IdentityUpdate {
        status: None,
        roles: Some(names.iter().map(|n| n.to_string()).collect()),
    }
}

async fn password_login(
    app: &TestApp,
    password: &str,
) -> Result<identity_service::services::LoginOutcome, ServiceError> {
    app.identity()
        .login(
            &target("alice@example.com"),
            LoginProof::Password(Password::new(password)),
            Scope::Consumer,
            &meta(),
        )
        .await
}

#[tokio::test]
async fn test_deactivation_signs_identity_out() {
    let app = TestApp::new().await;
    let root = root_context(&app).await;
    let alice = app.register("alice@example.com", Scope::Consumer).await;
    let id = alice.identity.identity_id;

    let view = app
        .identity()
        .update_identity(id, status(IdentityStatus::Inactive), &root)
        .await
        .unwrap();
    assert_eq!(view.identity.status(), IdentityStatus::Inactive);

    let bearer = app
        .identity()
        .authorize(&alice.tokens.access_token, None)
        .await;
    assert!(matches!(bearer, Err(ServiceError::Inactive)));

    let refresh = app
        .identity()
        .refresh(&alice.tokens.refresh_token, &meta())
        .await;
    assert!(matches!(refresh, Err(ServiceError::InvalidToken)));
    assert!(app.identity().list_sessions(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reactivated_identity_can_sign_in_again() {
    let app = TestApp::new().await;
    let root = root_context(&app).await;
    let alice = app.register("alice@example.com", Scope::Consumer).await;
    let id = alice.identity.identity_id;
    app.identity()
        .set_password(id, &Password::new("correct-horse"))
        .await
        .unwrap();

    app.identity()
        .update_identity(id, status(IdentityStatus::Inactive), &root)
        .await
        .unwrap();

    let inactive = password_login(&app, "correct-horse").await;
    assert!(matches!(inactive, Err(ServiceError::Inactive)));

    app.identity()
        .update_identity(id, status(IdentityStatus::Active), &root)
        .await
        .unwrap();
    assert!(password_login(&app, "correct-horse").await.is_ok());
}

#[tokio::test]
async fn test_roles_are_replaced_within_scope() {
    let app = TestApp::new().await;
    let root = root_context(&app).await;
    let ops = app
        .identity()
        .bootstrap_super_admin("ops@example.com")
        .await
        .unwrap();

    let view = app
        .identity()
        .update_identity(ops, roles(&["staff"]), &root)
        .await
        .unwrap();
    assert_eq!(view.roles, vec!["staff".to_string()]);
    assert!(!view.permissions.contains(&"users:manage".to_string()));
    assert!(view.permissions.contains(&"customers:read".to_string()));

    let cleared = app
        .identity()
        .update_identity(ops, roles(&[]), &root)
        .await
        .unwrap();
    assert!(cleared.roles.is_empty());
    assert!(cleared.permissions.is_empty());
}

#[tokio::test]
async fn test_unknown_role_changes_nothing() {
    let app = TestApp::new().await;
    let root = root_context(&app).await;
    let alice = app.register("alice@example.com", Scope::Consumer).await;
    let id = alice.identity.identity_id;

    // `rider` exists, but only in the delivery scope
    for names in [&["customer", "rider"][..], &["auditor"][..]] {
        let result = app
            .identity()
            .update_identity(id, roles(names), &root)
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    let held = app.identity().rbac().role_names(id, Scope::Consumer).await.unwrap();
    assert_eq!(held, vec!["customer".to_string()]);
}

#[tokio::test]
async fn test_update_requires_manage_permission() {
    let app = TestApp::new().await;
    let alice = app.register("alice@example.com", Scope::Consumer).await;
    let bob = app.register("bob@example.com", Scope::Consumer).await;
    let alice_ctx = app
        .identity()
        .authorize(&alice.tokens.access_token, None)
        .await
        .unwrap();

    let result = app
        .identity()
        .update_identity(bob.identity.identity_id, status(IdentityStatus::Inactive), &alice_ctx)
        .await;
    assert!(matches!(result, Err(ServiceError::AccessDenied(_))));

    let bob_now = app.identity().me(bob.identity.identity_id).await.unwrap();
    assert!(bob_now.identity.is_active());
}

#[tokio::test]
async fn test_invalid_updates_are_rejected() {
    let app = TestApp::new().await;
    let root = root_context(&app).await;
    let alice = app.register("alice@example.com", Scope::Consumer).await;

    let own = app
        .identity()
        .update_identity(root.identity_id, status(IdentityStatus::Inactive), &root)
        .await;
    assert!(matches!(own, Err(ServiceError::Validation(_))));

    let pending = app
        .identity()
        .update_identity(alice.identity.identity_id, status(IdentityStatus::Pending), &root)
        .await;
    assert!(matches!(pending, Err(ServiceError::Validation(_))));

    let missing = app
        .identity()
        .update_identity(uuid::Uuid::new_v4(), status(IdentityStatus::Inactive), &root)
        .await;
    assert!(matches!(missing, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn test_list_identities_by_scope() {
    let app = TestApp::new().await;
    app.register("alice@example.com", Scope::Consumer).await;
    app.register("alice@example.com", Scope::Merchant).await;
    app.register("bob@example.com", Scope::Consumer).await;

    let consumers = app
        .identity()
        .list_identities(Some(Scope::Consumer))
        .await
        .unwrap();
    assert_eq!(consumers.len(), 2);
    assert!(consumers
        .iter()
        .all(|v| v.roles == vec!["customer".to_string()]));

    let everyone = app.identity().list_identities(None).await.unwrap();
    assert_eq!(everyone.len(), 3);
}
