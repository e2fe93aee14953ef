use service_core::axum::{extract::State, Json};

use crate::{
    dtos::{
        auth::{MeResponse, UpdateProfileRequest},
        ErrorResponse,
    },
    middleware::AuthUser,
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Current identity with roles and permissions
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Caller identity", body = MeResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Profile",
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MeResponse>, ServiceError> {
    let view = state.identity.me(user.identity_id).await?;
    Ok(Json(view.into()))
}

/// Update display name and avatar
#[utoipa::path(
    put,
    path = "/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated identity", body = MeResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Profile",
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<MeResponse>, ServiceError> {
    let view = state
        .identity
        .update_profile(
            user.identity_id,
            req.display_name.as_deref(),
            req.avatar_url.as_deref(),
        )
        .await?;
    Ok(Json(view.into()))
}
