//! Identity model - one account per (target, scope).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Scope, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStatus {
    Pending,
    Active,
    Inactive,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Pending => "pending",
            IdentityStatus::Active => "active",
            IdentityStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for IdentityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IdentityStatus::Pending),
            "active" => Ok(IdentityStatus::Active),
            "inactive" => Ok(IdentityStatus::Inactive),
            _ => Err(format!("Invalid identity status: {}", s)),
        }
    }
}

/// Identity entity. The same target may own one identity per scope; they are unrelated rows.
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub identity_id: Uuid,
    pub target_text: String,
    pub scope_code: String,
    pub password_hash: Option<String>,
    pub status_code: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Identity {
    /// A not-yet-activated identity, created on the first registration attempt.
    pub fn new_pending(target: &Target, scope: Scope) -> Self {
        Self::new(target, scope, IdentityStatus::Pending, false)
    }

    /// An identity that is usable immediately (lazily created admins, bootstrap).
    pub fn new_active(target: &Target, scope: Scope) -> Self {
        Self::new(target, scope, IdentityStatus::Active, target.is_email())
    }

    fn new(target: &Target, scope: Scope, status: IdentityStatus, email_verified: bool) -> Self {
        let now = Utc::now();
        Self {
            identity_id: Uuid::new_v4(),
            target_text: target.as_str().to_string(),
            scope_code: scope.as_str().to_string(),
            password_hash: None,
            status_code: status.as_str().to_string(),
            display_name: None,
            avatar_url: None,
            email_verified,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Unknown status codes are treated as inactive.
    pub fn status(&self) -> IdentityStatus {
        self.status_code.parse().unwrap_or(IdentityStatus::Inactive)
    }

    pub fn is_active(&self) -> bool {
        self.status() == IdentityStatus::Active
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope_code.parse().ok()
    }

    pub fn is_profile_complete(&self) -> bool {
        self.display_name
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn sanitized(&self) -> SanitizedIdentity {
        SanitizedIdentity {
            id: self.identity_id,
            target: self.target_text.clone(),
            scope: self.scope_code.clone(),
            status: self.status_code.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            email_verified: self.email_verified,
            has_password: self.password_hash.is_some(),
            created_at: self.created_utc,
        }
    }
}

/// Identity as returned to clients; never carries the password hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedIdentity {
    pub id: Uuid,
    #[schema(example = "alice@example.com")]
    pub target: String,
    #[schema(example = "consumer")]
    pub scope: String,
    #[schema(example = "active")]
    pub status: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
}
