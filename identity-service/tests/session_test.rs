mod common;

use common::{meta, TestApp};
use identity_service::{
    models::{Scope, SessionMeta},
    services::ServiceError,
};

#[tokio::test]
async fn test_refresh_rotates_and_retires_old_token() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;
    let first = login.tokens.refresh_token.clone();

    let rotated = app.identity().refresh(&first, &meta()).await.unwrap();
    assert_ne!(rotated.refresh_token, first);

    let reuse = app.identity().refresh(&first, &meta()).await;
    assert!(matches!(reuse, Err(ServiceError::InvalidToken)));

    // The replacement keeps working
    app.identity()
        .refresh(&rotated.refresh_token, &meta())
        .await
        .expect("rotated token redeems");
}

#[tokio::test]
async fn test_concurrent_refresh_has_one_winner() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;
    let token = login.tokens.refresh_token.clone();
    let meta = meta();

    let (a, b, c) = tokio::join!(
        app.identity().refresh(&token, &meta),
        app.identity().refresh(&token, &meta),
        app.identity().refresh(&token, &meta),
    );

    let winners = [&a, &b, &c].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in [a, b, c] {
        if let Err(e) = result {
            assert!(matches!(e, ServiceError::InvalidToken));
        }
    }
}

#[tokio::test]
async fn test_rotation_keeps_scope_and_identity() {
    let app = TestApp::new().await;
    let login = app.register("rider@example.com", Scope::Delivery).await;

    let rotated = app
        .identity()
        .refresh(&login.tokens.refresh_token, &meta())
        .await
        .unwrap();

    let context = app
        .identity()
        .authorize(&rotated.access_token, Some(Scope::Delivery))
        .await
        .unwrap();
    assert_eq!(context.identity_id, login.identity.identity_id);
    assert_eq!(context.scope, Scope::Delivery);
}

#[tokio::test]
async fn test_logout_revokes_only_that_session() {
    let app = TestApp::new().await;
    let first = app.register("alice@example.com", Scope::Consumer).await;
    let second = app.register("alice@example.com", Scope::Consumer).await;

    app.identity()
        .logout(&first.tokens.refresh_token)
        .await
        .unwrap();
    // Logging out twice is harmless
    app.identity()
        .logout(&first.tokens.refresh_token)
        .await
        .unwrap();

    let revoked = app
        .identity()
        .refresh(&first.tokens.refresh_token, &meta())
        .await;
    assert!(matches!(revoked, Err(ServiceError::InvalidToken)));

    app.identity()
        .refresh(&second.tokens.refresh_token, &meta())
        .await
        .expect("other session unaffected");
}

#[tokio::test]
async fn test_logout_all_and_session_listing() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;
    let id = login.identity.identity_id;
    app.register("alice@example.com", Scope::Consumer).await;

    let sessions = app.identity().list_sessions(id).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions
        .iter()
        .all(|s| s.device_id.as_deref() == Some("test-device")
            && s.user_agent.as_deref() == Some("integration-test")));

    let revoked = app.identity().logout_all(id).await.unwrap();
    assert_eq!(revoked, 2);
    assert!(app.identity().list_sessions(id).await.unwrap().is_empty());

    let after = app
        .identity()
        .refresh(&login.tokens.refresh_token, &meta())
        .await;
    assert!(matches!(after, Err(ServiceError::InvalidToken)));
}

#[tokio::test]
async fn test_rotation_records_new_client_metadata() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;
    let id = login.identity.identity_id;

    let moved = SessionMeta {
        device_id: None,
        ip_address: Some("203.0.113.9".to_string()),
        user_agent: Some("mobile-app/2.0".to_string()),
    };
    app.identity()
        .refresh(&login.tokens.refresh_token, &moved)
        .await
        .unwrap();

    let sessions = app.identity().list_sessions(id).await.unwrap();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session.ip_address.as_deref(), Some("203.0.113.9"));
    assert_eq!(session.user_agent.as_deref(), Some("mobile-app/2.0"));
    // Missing values carry over from the rotated session
    assert_eq!(session.device_id.as_deref(), Some("test-device"));
}

#[tokio::test]
async fn test_access_token_is_bound_to_its_scope() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;

    let mismatch = app
        .identity()
        .authorize(&login.tokens.access_token, Some(Scope::Merchant))
        .await;
    assert!(matches!(mismatch, Err(ServiceError::AccessDenied(_))));

    let undeclared = app
        .identity()
        .authorize(&login.tokens.access_token, None)
        .await
        .unwrap();
    assert_eq!(undeclared.scope, Scope::Consumer);
    assert!(undeclared.has("orders:create"));
}

#[tokio::test]
async fn test_garbage_tokens_are_rejected() {
    let app = TestApp::new().await;

    let access = app.identity().authorize("not-a-jwt", None).await;
    assert!(matches!(access, Err(ServiceError::InvalidToken)));

    let refresh = app.identity().refresh("deadbeef", &meta()).await;
    assert!(matches!(refresh, Err(ServiceError::InvalidToken)));
}

#[tokio::test]
async fn test_deleted_identity_cannot_refresh() {
    let app = TestApp::new().await;
    let login = app.register("alice@example.com", Scope::Consumer).await;

    app.identity()
        .delete_identity(login.identity.identity_id)
        .await
        .unwrap();

    let refresh = app
        .identity()
        .refresh(&login.tokens.refresh_token, &meta())
        .await;
    assert!(matches!(refresh, Err(ServiceError::InvalidToken)));

    let access = app
        .identity()
        .authorize(&login.tokens.access_token, None)
        .await;
    assert!(matches!(access, Err(ServiceError::InvalidToken)));
}
