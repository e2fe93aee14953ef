//! Session model - server-side record behind each refresh token.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Scope;

/// Client metadata captured when a session is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMeta {
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Session entity.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub identity_id: Uuid,
    pub scope_code: String,
    pub refresh_token_hash: String,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Session {
    pub fn new(
        identity_id: Uuid,
        scope: Scope,
        refresh_token_hash: String,
        meta: &SessionMeta,
        expiry_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            identity_id,
            scope_code: scope.as_str().to_string(),
            refresh_token_hash,
            device_id: meta.device_id.clone(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            expiry_utc,
            revoked_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Neither revoked nor expired.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_utc.is_none() && self.expiry_utc > now
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope_code.parse().ok()
    }
}

/// Session info for API responses.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub scope: String,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionInfo {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.session_id,
            scope: s.scope_code,
            device_id: s.device_id,
            ip_address: s.ip_address,
            user_agent: s.user_agent,
            created_at: s.created_utc,
            expires_at: s.expiry_utc,
        }
    }
}
