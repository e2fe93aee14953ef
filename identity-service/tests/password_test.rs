mod common;

use common::{meta, target, TestApp};
use identity_service::{
    models::Scope,
    services::{LoginProof, ServiceError},
    utils::Password,
};

async fn password_login(
    app: &TestApp,
    raw_target: &str,
    password: &str,
    scope: Scope,
) -> Result<identity_service::services::LoginOutcome, ServiceError> {
    app.identity()
        .login(
            &target(raw_target),
            LoginProof::Password(Password::new(password)),
            scope,
            &meta(),
        )
        .await
}

#[tokio::test]
async fn test_set_password_enables_password_login() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;

    let before = password_login(&app, "alice@example.com", "correct-horse", Scope::Consumer).await;
    assert!(matches!(before, Err(ServiceError::InvalidCredentials)));

    app.identity()
        .set_password(login.identity.identity_id, &Password::new("correct-horse"))
        .await
        .unwrap();

    let outcome = password_login(&app, "alice@example.com", "correct-horse", Scope::Consumer)
        .await
        .unwrap();
    assert_eq!(outcome.identity.identity_id, login.identity.identity_id);
    assert!(outcome.identity.sanitized().has_password);

    let wrong = password_login(&app, "alice@example.com", "wrong-horse", Scope::Consumer).await;
    assert!(matches!(wrong, Err(ServiceError::InvalidCredentials)));
}

#[tokio::test]
async fn test_password_is_per_scope() {
    let app = TestApp::new().await;
    let consumer = app.register("alice@example.com", Scope::Consumer).await;
    app.register("alice@example.com", Scope::Merchant).await;

    app.identity()
        .set_password(consumer.identity.identity_id, &Password::new("consumer-pass"))
        .await
        .unwrap();

    let merchant = password_login(&app, "alice@example.com", "consumer-pass", Scope::Merchant).await;
    assert!(matches!(merchant, Err(ServiceError::InvalidCredentials)));

    let unknown = password_login(&app, "alice@example.com", "consumer-pass", Scope::Delivery).await;
    assert!(matches!(unknown, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn test_short_password_is_rejected() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;

    let result = app
        .identity()
        .set_password(login.identity.identity_id, &Password::new("short"))
        .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn test_change_password_requires_old_password() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;
    let id = login.identity.identity_id;

    let unset = app
        .identity()
        .change_password(id, &Password::new("anything"), &Password::new("new-password"))
        .await;
    assert!(matches!(unset, Err(ServiceError::NoPasswordSet)));

    app.identity()
        .set_password(id, &Password::new("first-password"))
        .await
        .unwrap();

    let wrong_old = app
        .identity()
        .change_password(id, &Password::new("not-it"), &Password::new("second-password"))
        .await;
    assert!(matches!(wrong_old, Err(ServiceError::InvalidCredentials)));

    app.identity()
        .change_password(id, &Password::new("first-password"), &Password::new("second-password"))
        .await
        .unwrap();

    assert!(password_login(&app, "alice@example.com", "second-password", Scope::Consumer)
        .await
        .is_ok());
    assert!(password_login(&app, "alice@example.com", "first-password", Scope::Consumer)
        .await
        .is_err());
}

#[tokio::test]
async fn test_reset_password_replaces_password_and_revokes_sessions() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;
    let alice = target("alice@example.com");

    app.identity()
        .set_password(login.identity.identity_id, &Password::new("forgotten-pass"))
        .await
        .unwrap();

    app.identity()
        .forgot_password(&alice, Scope::Consumer)
        .await
        .unwrap();
    let code = app.last_code("alice@example.com");
    let last = app.notifier.messages_to("alice@example.com").pop().unwrap();
    assert_eq!(last.subject, "Password Reset Request");

    app.identity()
        .reset_password(&alice, &code, &Password::new("brand-new-pass"), Scope::Consumer)
        .await
        .unwrap();

    assert!(password_login(&app, "alice@example.com", "brand-new-pass", Scope::Consumer)
        .await
        .is_ok());
    assert!(password_login(&app, "alice@example.com", "forgotten-pass", Scope::Consumer)
        .await
        .is_err());

    let old_session = app
        .identity()
        .refresh(&login.tokens.refresh_token, &meta())
        .await;
    assert!(matches!(old_session, Err(ServiceError::InvalidToken)));
}

#[tokio::test]
async fn test_reset_code_cannot_complete_registration() {
    let app = TestApp::new().await;
    app.register("alice@example.com", Scope::Consumer).await;
    let alice = target("alice@example.com");

    app.identity()
        .forgot_password(&alice, Scope::Consumer)
        .await
        .unwrap();
    let reset_code = app.last_code("alice@example.com");

    // Codes are partitioned by purpose
    let result = app
        .identity()
        .complete_registration(&alice, &reset_code, Scope::Consumer, &meta())
        .await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn test_forgot_password_for_unknown_identity() {
    let app = TestApp::new().await;

    let result = app
        .identity()
        .forgot_password(&target("ghost@example.com"), Scope::Consumer)
        .await;

    assert!(matches!(result, Err(ServiceError::NotFound(_))));
    assert!(app.notifier.messages().is_empty());
}
