use service_core::axum::{extract::State, Json};
use service_core::middleware::rate_limit::check_key;

use super::parse_target;
use crate::{
    dtos::{
        auth::{LoginResponse, SendOtpRequest, VerifyOtpRequest},
        ErrorResponse, MessageResponse,
    },
    middleware::{AppScope, ClientMeta},
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Send a registration / sign-in code
///
/// Creates a pending identity for (target, scope) when none exists.
#[utoipa::path(
    post,
    path = "/auth/otp/send",
    request_body = SendOtpRequest,
    params(("x-app-scope" = String, Header, description = "consumer, merchant or delivery")),
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 403, description = "Scope requires an admin access request", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many codes requested", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn send_otp(
    State(state): State<AppState>,
    AppScope(scope): AppScope,
    ValidatedJson(req): ValidatedJson<SendOtpRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let target = parse_target(&req.target)?;

    check_key(
        &state.otp_send_limiter,
        &format!("{}:{}", scope, target),
        "Too many verification codes requested. Please try again later.",
    )?;

    state.identity.initiate_registration(&target, scope).await?;

    Ok(Json(MessageResponse::new("Verification code sent")))
}

/// Verify a code and sign in
///
/// Activates the identity on first use and assigns the scope's default role.
#[utoipa::path(
    post,
    path = "/auth/otp/verify",
    request_body = VerifyOtpRequest,
    params(("x-app-scope" = String, Header, description = "consumer, merchant or delivery")),
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 403, description = "Inactive account", body = ErrorResponse),
        (status = 404, description = "No code issued", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    AppScope(scope): AppScope,
    ClientMeta(meta): ClientMeta,
    ValidatedJson(req): ValidatedJson<VerifyOtpRequest>,
) -> Result<Json<LoginResponse>, ServiceError> {
    let target = parse_target(&req.target)?;

    let outcome = state
        .identity
        .complete_registration(&target, &req.code, scope, &meta)
        .await?;

    Ok(Json(outcome.into()))
}
