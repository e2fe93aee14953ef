mod common;

use common::{meta, target, TestApp, APPROVER, BASE_URL};
use identity_service::{
    models::{AdminRequestStatus, Scope},
    services::{AdminVerifyOutcome, LoginOutcome, LoginProof, ServiceError},
    utils::Password,
};
use uuid::Uuid;

const OPS: &str = "ops@example.com";

/// Sends and verifies an admin code, returning the gate's answer.
async fn request_and_verify(app: &TestApp, email: &str) -> AdminVerifyOutcome {
    let email_target = target(email);
    app.identity()
        .request_admin_access(&email_target)
        .await
        .expect("request admin access");
    let code = app.last_code(email);
    app.identity()
        .verify_admin_access(&email_target, &code, &meta())
        .await
        .expect("verify admin access")
}

fn pending_id(outcome: AdminVerifyOutcome) -> Uuid {
    match outcome {
        AdminVerifyOutcome::PendingApproval { request_id } => request_id,
        AdminVerifyOutcome::LoggedIn(_) => panic!("expected pending approval"),
    }
}

fn logged_in(outcome: AdminVerifyOutcome) -> LoginOutcome {
    match outcome {
        AdminVerifyOutcome::LoggedIn(outcome) => *outcome,
        AdminVerifyOutcome::PendingApproval { .. } => panic!("expected sign-in"),
    }
}

#[tokio::test]
async fn test_first_verification_is_pending_and_notifies_approver() {
    let app = TestApp::new().await;

    let request_id = pending_id(request_and_verify(&app, OPS).await);

    let to_approver = app.notifier.messages_to(APPROVER);
    assert_eq!(to_approver.len(), 1);
    assert!(to_approver[0].body.contains(OPS));
    assert!(to_approver[0]
        .body
        .contains(&format!("{}/auth/admin/approve-magic?token=", BASE_URL)));

    let pending = app
        .identity()
        .list_admin_requests(Some(AdminRequestStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id, request_id);
    assert_eq!(pending[0].email_text, OPS);
}

#[tokio::test]
async fn test_login_is_denied_until_approved() {
    let app = TestApp::new().await;
    pending_id(request_and_verify(&app, OPS).await);

    let result = app
        .identity()
        .login(
            &target(OPS),
            LoginProof::Password(Password::new("whatever-pass")),
            Scope::Admin,
            &meta(),
        )
        .await;
    assert!(matches!(result, Err(ServiceError::AccessDenied(_))));

    // Still pending on a second verification, same request
    let first = app
        .identity()
        .list_admin_requests(None)
        .await
        .unwrap()
        .remove(0)
        .request_id;
    let again = pending_id(request_and_verify(&app, OPS).await);
    assert_eq!(again, first);
}

#[tokio::test]
async fn test_approval_link_unlocks_admin_sign_in() {
    let app = TestApp::new().await;
    pending_id(request_and_verify(&app, OPS).await);

    let token = app
        .notifier
        .last_link_token_for(APPROVER)
        .expect("approval link sent");
    let approved = app
        .identity()
        .approve_admin_with_token(&token)
        .await
        .unwrap();
    assert!(approved.is_approved());
    assert_eq!(approved.approved_by_text.as_deref(), Some("system:approval-link"));

    let notice = app.notifier.messages_to(OPS).pop().unwrap();
    assert_eq!(notice.subject, "Admin Access Approved");

    let outcome = logged_in(request_and_verify(&app, OPS).await);
    assert_eq!(outcome.identity.scope(), Some(Scope::Admin));
    assert!(outcome.identity.is_active());
    assert_eq!(outcome.roles, vec!["staff".to_string()]);
    assert!(outcome.permissions.contains(&"customers:read".to_string()));
    assert!(!outcome.permissions.contains(&"users:manage".to_string()));
}

#[tokio::test]
async fn test_approval_is_idempotent() {
    let app = TestApp::new().await;
    pending_id(request_and_verify(&app, OPS).await);
    let token = app.notifier.last_link_token_for(APPROVER).unwrap();

    app.identity().approve_admin_with_token(&token).await.unwrap();
    let second = app.identity().approve_admin_with_token(&token).await.unwrap();
    assert!(second.is_approved());

    let approvals = app
        .notifier
        .messages_to(OPS)
        .into_iter()
        .filter(|m| m.subject == "Admin Access Approved")
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
async fn test_tampered_link_is_rejected() {
    let app = TestApp::new().await;
    pending_id(request_and_verify(&app, OPS).await);
    let token = app.notifier.last_link_token_for(APPROVER).unwrap();

    let mut tampered = token.clone();
    tampered.push('x');
    let result = app.identity().approve_admin_with_token(&tampered).await;
    assert!(matches!(result, Err(ServiceError::InvalidToken)));

    let still_pending = app
        .identity()
        .list_admin_requests(Some(AdminRequestStatus::Approved))
        .await
        .unwrap();
    assert!(still_pending.is_empty());
}

#[tokio::test]
async fn test_approval_link_is_bound_to_admin_scope() {
    let app = TestApp::new().await;
    let request_id = pending_id(request_and_verify(&app, OPS).await);

    let forged = identity_service::services::JwtService::from_secret(common::TEST_SECRET)
        .unwrap()
        .generate_approval_token(request_id, OPS, Scope::Merchant)
        .unwrap();
    let result = app.identity().approve_admin_with_token(&forged).await;
    assert!(matches!(result, Err(ServiceError::InvalidToken)));

    let approved = app
        .identity()
        .list_admin_requests(Some(AdminRequestStatus::Approved))
        .await
        .unwrap();
    assert!(approved.is_empty());
}

#[tokio::test]
async fn test_access_token_is_not_an_approval_token() {
    let app = TestApp::new().await;
    let consumer = app.register("alice@example.com", Scope::Consumer).await;

    let result = app
        .identity()
        .approve_admin_with_token(&consumer.tokens.access_token)
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidToken)));
}

#[tokio::test]
async fn test_manual_approval_requires_manage_permission() {
    let app = TestApp::new().await;
    let request_id = pending_id(request_and_verify(&app, OPS).await);

    let consumer = app.register("alice@example.com", Scope::Consumer).await;
    let consumer_ctx = app
        .identity()
        .authorize(&consumer.tokens.access_token, None)
        .await
        .unwrap();
    let denied = app
        .identity()
        .approve_admin_request(request_id, &consumer_ctx)
        .await;
    assert!(matches!(denied, Err(ServiceError::AccessDenied(_))));

    let root = app.super_admin("root@example.com").await;
    let root_ctx = app
        .identity()
        .authorize(&root.tokens.access_token, Some(Scope::Admin))
        .await
        .unwrap();
    let approved = app
        .identity()
        .approve_admin_request(request_id, &root_ctx)
        .await
        .unwrap();
    assert_eq!(
        approved.approved_by_text,
        Some(format!("user:{}", root.identity.identity_id))
    );

    let missing = app
        .identity()
        .approve_admin_request(Uuid::new_v4(), &root_ctx)
        .await;
    assert!(matches!(missing, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn test_super_admin_bypasses_approval() {
    let app = TestApp::new().await;

    let root = app.super_admin("root@example.com").await;

    assert!(root.roles.contains(&"super_admin".to_string()));
    assert!(root.permissions.contains(&"users:manage".to_string()));

    // Bootstrapping again is a no-op
    let again = app
        .identity()
        .bootstrap_super_admin("root@example.com")
        .await
        .unwrap();
    assert_eq!(again, root.identity.identity_id);
}

#[tokio::test]
async fn test_admin_access_requires_email() {
    let app = TestApp::new().await;

    let result = app
        .identity()
        .request_admin_access(&target("+2348012345678"))
        .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn test_code_delivery_failure_is_reported() {
    use identity_service::services::{IdentityService, IdentitySettings, JwtService, MemoryStore};
    use std::sync::Arc;

    let config = common::test_config();
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(identity_service::services::MockNotifier::failing());
    let identity = IdentityService::new(
        store,
        JwtService::from_secret(common::TEST_SECRET).unwrap(),
        notifier,
        IdentitySettings::from_config(&config),
    );

    let result = identity.request_admin_access(&target(OPS)).await;
    assert!(matches!(
        result,
        Err(ServiceError::Store(service_core::error::AppError::EmailError(_)))
    ));
}

#[tokio::test]
async fn test_deleting_admin_identity_withdraws_pending_request() {
    let app = TestApp::new().await;
    let root = app.super_admin("root@example.com").await;

    // A super admin has no approved request, so verifying records a pending one
    pending_id(request_and_verify(&app, "root@example.com").await);

    app.identity()
        .delete_identity(root.identity.identity_id)
        .await
        .unwrap();

    let pending = app
        .identity()
        .list_admin_requests(Some(AdminRequestStatus::Pending))
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_deleting_admin_identity_keeps_approval_record() {
    let app = TestApp::new().await;
    let root = app.super_admin("root@example.com").await;
    let root_ctx = app
        .identity()
        .authorize(&root.tokens.access_token, Some(Scope::Admin))
        .await
        .unwrap();

    let request_id = pending_id(request_and_verify(&app, OPS).await);
    app.identity()
        .approve_admin_request(request_id, &root_ctx)
        .await
        .unwrap();
    let ops = logged_in(request_and_verify(&app, OPS).await);

    app.identity()
        .delete_identity(ops.identity.identity_id)
        .await
        .unwrap();

    let access = app
        .identity()
        .authorize(&ops.tokens.access_token, Some(Scope::Admin))
        .await;
    assert!(matches!(access, Err(ServiceError::InvalidToken)));

    let approved = app
        .identity()
        .list_admin_requests(Some(AdminRequestStatus::Approved))
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
}
