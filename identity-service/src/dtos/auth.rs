use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{SanitizedIdentity, SessionInfo};
use crate::services::{IdentityView, LoginOutcome};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SendOtpRequest {
    #[validate(custom(function = "crate::utils::validate_target"))]
    #[schema(example = "user@example.com")]
    pub target: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyOtpRequest {
    #[validate(custom(function = "crate::utils::validate_target"))]
    #[schema(example = "user@example.com")]
    pub target: String,

    #[validate(custom(function = "crate::utils::validate_otp_code"))]
    #[schema(example = "123456")]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(custom(function = "crate::utils::validate_target"))]
    #[schema(example = "user@example.com")]
    pub target: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(custom(function = "crate::utils::validate_target"))]
    #[schema(example = "user@example.com")]
    pub target: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(custom(function = "crate::utils::validate_target"))]
    #[schema(example = "user@example.com")]
    pub target: String,

    #[validate(custom(function = "crate::utils::validate_otp_code"))]
    #[schema(example = "123456")]
    pub code: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(min_length = 8)]
    pub new_password: String,

    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetPasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(min_length = 8)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Old password is required"))]
    pub old_password: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(min_length = 8)]
    pub new_password: String,

    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    #[schema(example = "Ada Obi")]
    pub display_name: Option<String>,

    #[validate(url(message = "Avatar must be a URL"))]
    #[schema(example = "https://cdn.example.com/a.png")]
    pub avatar_url: Option<String>,
}

/// Sign-in result shared by OTP verification, password login and admin verification.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub identity: SanitizedIdentity,
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    #[schema(example = 900)]
    pub expires_in: i64,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub profile_complete: bool,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            identity: outcome.identity.sanitized(),
            access_token: outcome.tokens.access_token,
            refresh_token: outcome.tokens.refresh_token,
            token_type: outcome.tokens.token_type,
            expires_in: outcome.tokens.expires_in,
            roles: outcome.roles,
            permissions: outcome.permissions,
            profile_complete: outcome.profile_complete,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub identity: SanitizedIdentity,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub profile_complete: bool,
}

impl From<IdentityView> for MeResponse {
    fn from(view: IdentityView) -> Self {
        Self {
            identity: view.identity.sanitized(),
            roles: view.roles,
            permissions: view.permissions,
            profile_complete: view.profile_complete,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutAllResponse {
    #[schema(example = 3)]
    pub revoked: u64,
}
