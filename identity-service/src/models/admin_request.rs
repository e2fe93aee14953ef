//! Admin access requests - the human approval record for the privileged scope.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRequestStatus {
    Pending,
    Approved,
}

impl AdminRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRequestStatus::Pending => "pending",
            AdminRequestStatus::Approved => "approved",
        }
    }
}

impl std::str::FromStr for AdminRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AdminRequestStatus::Pending),
            "approved" => Ok(AdminRequestStatus::Approved),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// Who approved a request. Recorded on the row as `approved_by_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalActor {
    /// An authenticated identity holding the approval permission.
    User(Uuid),
    /// The signed approval link; no interactive approver.
    System,
}

impl ApprovalActor {
    pub fn audit_label(&self) -> String {
        match self {
            ApprovalActor::User(id) => format!("user:{}", id),
            ApprovalActor::System => "system:approval-link".to_string(),
        }
    }
}

/// Request entity, unique per email.
#[derive(Debug, Clone, FromRow)]
pub struct AdminAccessRequest {
    pub request_id: Uuid,
    pub email_text: String,
    pub scope_code: String,
    pub status_code: String,
    pub requested_utc: DateTime<Utc>,
    pub approved_utc: Option<DateTime<Utc>>,
    pub approved_by_text: Option<String>,
}

impl AdminAccessRequest {
    pub fn new_pending(email: &str, scope: Scope) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            email_text: email.to_string(),
            scope_code: scope.as_str().to_string(),
            status_code: AdminRequestStatus::Pending.as_str().to_string(),
            requested_utc: Utc::now(),
            approved_utc: None,
            approved_by_text: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status_code == AdminRequestStatus::Approved.as_str()
    }

    pub fn view(&self) -> AdminRequestView {
        AdminRequestView {
            id: self.request_id,
            email: self.email_text.clone(),
            scope: self.scope_code.clone(),
            status: self.status_code.clone(),
            requested_at: self.requested_utc,
            approved_at: self.approved_utc,
            approved_by: self.approved_by_text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequestView {
    pub id: Uuid,
    pub email: String,
    pub scope: String,
    #[schema(example = "pending")]
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
}
