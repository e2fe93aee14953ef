use service_core::axum::{extract::State, Json};

use super::parse_target;
use crate::{
    dtos::{
        auth::{LoginRequest, LoginResponse, LogoutAllResponse, LogoutRequest, RefreshRequest, SessionsResponse},
        ErrorResponse, OkResponse,
    },
    middleware::{AppScope, AuthUser, ClientMeta},
    services::{IssuedTokens, LoginProof, ServiceError},
    utils::{Password, ValidatedJson},
    AppState,
};

/// Login with a password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    params(("x-app-scope" = String, Header, description = "Scope to sign in to")),
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Inactive or not approved", body = ErrorResponse),
        (status = 404, description = "No identity in this scope", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    AppScope(scope): AppScope,
    ClientMeta(meta): ClientMeta,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ServiceError> {
    let target = parse_target(&req.target)?;

    let outcome = state
        .identity
        .login(&target, LoginProof::Password(Password::new(req.password)), scope, &meta)
        .await?;

    Ok(Json(outcome.into()))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = IssuedTokens),
        (status = 401, description = "Invalid, revoked or expired refresh token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ClientMeta(meta): ClientMeta,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<IssuedTokens>, ServiceError> {
    let tokens = state.identity.refresh(&req.refresh_token, &meta).await?;
    Ok(Json(tokens))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = OkResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> Result<Json<OkResponse>, ServiceError> {
    state.identity.logout(&req.refresh_token).await?;
    Ok(Json(OkResponse::ok()))
}

/// Revoke every session of the caller
#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "Sessions revoked", body = LogoutAllResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<LogoutAllResponse>, ServiceError> {
    let revoked = state.identity.logout_all(user.identity_id).await?;
    Ok(Json(LogoutAllResponse { revoked }))
}

/// List active sessions of the caller
#[utoipa::path(
    get,
    path = "/auth/sessions",
    responses(
        (status = 200, description = "Active sessions", body = SessionsResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<SessionsResponse>, ServiceError> {
    let sessions = state.identity.list_sessions(user.identity_id).await?;
    Ok(Json(SessionsResponse {
        sessions: sessions.into_iter().map(Into::into).collect(),
    }))
}
