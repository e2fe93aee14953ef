//! Session/token manager: access tokens plus rotating refresh tokens.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::ServiceError;
use super::jwt::{AccessTokenClaims, JwtService};
use super::metrics;
use super::store::SessionStore;
use crate::models::{Scope, Session, SessionMeta};
use crate::utils::{generate_refresh_token, hash_token};

/// Token pair returned to the client.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip)]
    pub session_id: Uuid,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    jwt: JwtService,
    refresh_ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, jwt: JwtService, refresh_ttl: Duration) -> Self {
        Self {
            store,
            jwt,
            refresh_ttl,
        }
    }

    /// Opens a new session for an authenticated identity.
    #[tracing::instrument(skip(self, meta))]
    pub async fn issue(
        &self,
        identity_id: Uuid,
        scope: Scope,
        meta: &SessionMeta,
    ) -> Result<IssuedTokens, ServiceError> {
        let refresh_token = generate_refresh_token();
        let session = Session::new(
            identity_id,
            scope,
            hash_token(&refresh_token),
            meta,
            Utc::now() + self.refresh_ttl,
        );
        self.store.insert_session(&session).await?;

        self.tokens_for(&session, refresh_token)
    }

    /// Rotates the session behind `raw_refresh_token`. Of several concurrent
    /// redeemers of one token, exactly one succeeds.
    #[tracing::instrument(skip_all)]
    pub async fn redeem(
        &self,
        raw_refresh_token: &str,
        meta: &SessionMeta,
    ) -> Result<(IssuedTokens, Session), ServiceError> {
        let next_token = generate_refresh_token();

        let rotated = self
            .store
            .rotate_session(
                &hash_token(raw_refresh_token),
                &hash_token(&next_token),
                Utc::now() + self.refresh_ttl,
                meta,
            )
            .await?;

        let Some(session) = rotated else {
            metrics::record_refresh("rejected");
            return Err(ServiceError::InvalidToken);
        };

        metrics::record_refresh("rotated");
        tracing::info!(session_id = %session.session_id, "Refresh token rotated");

        let tokens = self.tokens_for(&session, next_token)?;
        Ok((tokens, session))
    }

    /// Idempotent.
    #[tracing::instrument(skip_all)]
    pub async fn revoke(&self, raw_refresh_token: &str) -> Result<(), ServiceError> {
        self.store
            .revoke_session(&hash_token(raw_refresh_token))
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn revoke_all(&self, identity_id: Uuid) -> Result<u64, ServiceError> {
        let revoked = self.store.revoke_all_sessions(identity_id).await?;
        tracing::info!(revoked, "Sessions revoked");
        Ok(revoked)
    }

    pub async fn list(&self, identity_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        Ok(self.store.list_active_sessions(identity_id).await?)
    }

    /// Validates a bearer access token.
    pub fn authenticate(&self, access_token: &str) -> Result<AccessTokenClaims, ServiceError> {
        self.jwt.validate_access_token(access_token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            ServiceError::InvalidToken
        })
    }

    fn tokens_for(
        &self,
        session: &Session,
        refresh_token: String,
    ) -> Result<IssuedTokens, ServiceError> {
        let scope = session.scope().ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "Session {} has unknown scope {}",
                session.session_id,
                session.scope_code
            ))
        })?;

        let access = self.jwt.generate_access_token(session.identity_id, scope)?;

        Ok(IssuedTokens {
            access_token: access.token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            session_id: session.session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(MemoryStore::new()),
            JwtService::from_secret("session-test-secret").unwrap(),
            Duration::days(7),
        )
    }

    #[tokio::test]
    async fn test_issue_and_authenticate() {
        let sessions = manager();
        let id = Uuid::new_v4();

        let tokens = sessions.issue(id, Scope::Delivery, &SessionMeta::default()).await.unwrap();
        let claims = sessions.authenticate(&tokens.access_token).unwrap();

        assert_eq!(claims.identity_id(), Some(id));
        assert_eq!(claims.scope, Scope::Delivery);
        assert_eq!(tokens.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_redeemed_token_cannot_be_replayed() {
        let sessions = manager();
        let tokens = sessions
            .issue(Uuid::new_v4(), Scope::Consumer, &SessionMeta::default())
            .await
            .unwrap();

        let (rotated, _) = sessions
            .redeem(&tokens.refresh_token, &SessionMeta::default())
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, tokens.refresh_token);

        let replay = sessions
            .redeem(&tokens.refresh_token, &SessionMeta::default())
            .await;
        assert!(matches!(replay, Err(ServiceError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let sessions = manager();
        let tokens = sessions
            .issue(Uuid::new_v4(), Scope::Consumer, &SessionMeta::default())
            .await
            .unwrap();

        sessions.revoke(&tokens.refresh_token).await.unwrap();
        sessions.revoke(&tokens.refresh_token).await.unwrap();
        sessions.revoke("never-issued").await.unwrap();

        let redeem = sessions
            .redeem(&tokens.refresh_token, &SessionMeta::default())
            .await;
        assert!(matches!(redeem, Err(ServiceError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_garbage_access_token() {
        assert!(matches!(
            manager().authenticate("not.a.jwt"),
            Err(ServiceError::InvalidToken)
        ));
    }
}
