use service_core::axum::{extract::State, Json};
use service_core::middleware::rate_limit::check_key;

use super::parse_target;
use crate::{
    dtos::{
        auth::{ChangePasswordRequest, ForgotPasswordRequest, ResetPasswordRequest, SetPasswordRequest},
        ErrorResponse, MessageResponse,
    },
    middleware::{AppScope, AuthUser},
    services::ServiceError,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Send a password reset code
#[utoipa::path(
    post,
    path = "/auth/password/forgot",
    request_body = ForgotPasswordRequest,
    params(("x-app-scope" = String, Header, description = "Scope of the account")),
    responses(
        (status = 200, description = "Reset code sent", body = MessageResponse),
        (status = 404, description = "No identity in this scope", body = ErrorResponse),
        (status = 429, description = "Too many codes requested", body = ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppScope(scope): AppScope,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let target = parse_target(&req.target)?;

    check_key(
        &state.otp_send_limiter,
        &format!("reset:{}:{}", scope, target),
        "Too many reset codes requested. Please try again later.",
    )?;

    state.identity.forgot_password(&target, scope).await?;
    Ok(Json(MessageResponse::new("Reset code sent")))
}

/// Reset a password with a code
///
/// Every session of the identity is revoked.
#[utoipa::path(
    post,
    path = "/auth/password/reset",
    request_body = ResetPasswordRequest,
    params(("x-app-scope" = String, Header, description = "Scope of the account")),
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    AppScope(scope): AppScope,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let target = parse_target(&req.target)?;
    state
        .identity
        .reset_password(&target, &req.code, &Password::new(req.new_password), scope)
        .await?;
    Ok(Json(MessageResponse::new("Password updated")))
}

/// Set a password on the caller's account
#[utoipa::path(
    post,
    path = "/auth/password/set",
    request_body = SetPasswordRequest,
    responses(
        (status = 200, description = "Password set", body = MessageResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Password",
    security(("bearer_auth" = []))
)]
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<SetPasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state
        .identity
        .set_password(user.identity_id, &Password::new(req.password))
        .await?;
    Ok(Json(MessageResponse::new("Password set successfully")))
}

/// Change the caller's password
#[utoipa::path(
    post,
    path = "/auth/password/change",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "No password set", body = ErrorResponse),
        (status = 401, description = "Old password incorrect", body = ErrorResponse)
    ),
    tag = "Password",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state
        .identity
        .change_password(
            user.identity_id,
            &Password::new(req.old_password),
            &Password::new(req.new_password),
        )
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}
