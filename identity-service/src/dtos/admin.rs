use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::auth::{LoginResponse, MeResponse};
use crate::models::AdminRequestView;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdminAccessRequestBody {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ops@example.com")]
    pub target: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdminVerifyRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ops@example.com")]
    pub target: String,

    #[validate(custom(function = "crate::utils::validate_otp_code"))]
    #[schema(example = "123456")]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingApprovalResponse {
    #[schema(example = "PENDING_APPROVAL")]
    pub status: String,
    pub message: String,
    pub request_id: Uuid,
}

impl PendingApprovalResponse {
    pub const STATUS: &'static str = "PENDING_APPROVAL";

    pub fn new(request_id: Uuid) -> Self {
        Self {
            status: Self::STATUS.to_string(),
            message: "Request submitted. Wait for admin approval.".to_string(),
            request_id,
        }
    }
}

/// Either still waiting for approval or a full sign-in.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum AdminVerifyResponse {
    PendingApproval(PendingApprovalResponse),
    LoggedIn(Box<LoginResponse>),
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListAdminRequestsQuery {
    /// `pending` or `approved`
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MagicApproveQuery {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminRequestsResponse {
    pub requests: Vec<AdminRequestView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApproveResponse {
    pub ok: bool,
    pub request: AdminRequestView,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListIdentitiesQuery {
    /// `consumer`, `merchant`, `delivery` or `admin`
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIdentityRequest {
    /// `active` or `inactive`
    #[schema(example = "inactive")]
    pub status: Option<String>,

    /// Replaces the identity's roles in its own scope
    #[validate(length(max = 16, message = "Too many roles"))]
    #[schema(example = json!(["customer"]))]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IdentitiesResponse {
    pub identities: Vec<MeResponse>,
}
