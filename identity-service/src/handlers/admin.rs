use service_core::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::auth::parse_target;
use crate::{
    dtos::{
        admin::{
            AdminAccessRequestBody, AdminRequestsResponse, AdminVerifyRequest,
            AdminVerifyResponse, ApproveResponse, IdentitiesResponse, ListAdminRequestsQuery,
            ListIdentitiesQuery, MagicApproveQuery, PendingApprovalResponse,
            UpdateIdentityRequest,
        },
        auth::MeResponse,
        ErrorResponse, MessageResponse, OkResponse,
    },
    middleware::{AuthUser, ClientMeta},
    models::{AdminRequestStatus, IdentityStatus, Scope},
    services::{AdminVerifyOutcome, IdentityUpdate, ServiceError},
    utils::ValidatedJson,
    AppState,
};

/// Request admin access
///
/// Sends a verification code to the email; the request itself is recorded
/// once the code is verified.
#[utoipa::path(
    post,
    path = "/auth/admin/request",
    request_body = AdminAccessRequestBody,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many codes requested", body = ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn request_access(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AdminAccessRequestBody>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let target = parse_target(&req.target)?;

    service_core::middleware::rate_limit::check_key(
        &state.otp_send_limiter,
        &format!("admin:{}", target),
        "Too many verification codes requested. Please try again later.",
    )?;

    state.identity.request_admin_access(&target).await?;
    Ok(Json(MessageResponse::new("Verification code sent")))
}

/// Verify an admin access code
///
/// Returns `PENDING_APPROVAL` until an approver accepts the request, then a
/// full admin sign-in.
#[utoipa::path(
    post,
    path = "/auth/admin/verify",
    request_body = AdminVerifyRequest,
    responses(
        (status = 200, description = "Pending approval or signed in", body = AdminVerifyResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn verify_access(
    State(state): State<AppState>,
    ClientMeta(meta): ClientMeta,
    ValidatedJson(req): ValidatedJson<AdminVerifyRequest>,
) -> Result<Json<AdminVerifyResponse>, ServiceError> {
    let target = parse_target(&req.target)?;

    let response = match state
        .identity
        .verify_admin_access(&target, &req.code, &meta)
        .await?
    {
        AdminVerifyOutcome::PendingApproval { request_id } => {
            AdminVerifyResponse::PendingApproval(PendingApprovalResponse::new(request_id))
        }
        AdminVerifyOutcome::LoggedIn(outcome) => {
            AdminVerifyResponse::LoggedIn(Box::new((*outcome).into()))
        }
    };

    Ok(Json(response))
}

/// List admin access requests
#[utoipa::path(
    get,
    path = "/auth/admin/requests",
    params(ListAdminRequestsQuery),
    responses(
        (status = 200, description = "Requests, newest first", body = AdminRequestsResponse),
        (status = 403, description = "Missing users:manage", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListAdminRequestsQuery>,
) -> Result<Json<AdminRequestsResponse>, ServiceError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<AdminRequestStatus>)
        .transpose()
        .map_err(ServiceError::Validation)?;

    let requests = state.identity.list_admin_requests(status).await?;
    Ok(Json(AdminRequestsResponse {
        requests: requests.iter().map(|r| r.view()).collect(),
    }))
}

/// Approve an admin access request
#[utoipa::path(
    post,
    path = "/auth/admin/requests/{id}/approve",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Approved", body = ApproveResponse),
        (status = 403, description = "Missing users:manage", body = ErrorResponse),
        (status = 404, description = "Request not found", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn approve_request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApproveResponse>, ServiceError> {
    let request = state.identity.approve_admin_request(id, &user).await?;
    Ok(Json(ApproveResponse {
        ok: true,
        request: request.view(),
    }))
}

/// List identities
///
/// Each identity with its current roles and permissions in its own scope.
#[utoipa::path(
    get,
    path = "/auth/admin/identities",
    params(ListIdentitiesQuery),
    responses(
        (status = 200, description = "Identities, newest first", body = IdentitiesResponse),
        (status = 403, description = "Missing users:manage", body = ErrorResponse),
        (status = 422, description = "Unknown scope", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn list_identities(
    State(state): State<AppState>,
    Query(query): Query<ListIdentitiesQuery>,
) -> Result<Json<IdentitiesResponse>, ServiceError> {
    let scope = query
        .scope
        .as_deref()
        .map(str::parse::<Scope>)
        .transpose()
        .map_err(ServiceError::Validation)?;

    let identities = state.identity.list_identities(scope).await?;
    Ok(Json(IdentitiesResponse {
        identities: identities.into_iter().map(Into::into).collect(),
    }))
}

/// Update an identity's status or roles
///
/// Deactivating revokes every session. Roles replace the current set.
#[utoipa::path(
    put,
    path = "/auth/admin/identities/{id}",
    params(("id" = Uuid, Path, description = "Identity id")),
    request_body = UpdateIdentityRequest,
    responses(
        (status = 200, description = "Updated identity", body = MeResponse),
        (status = 403, description = "Missing users:manage", body = ErrorResponse),
        (status = 404, description = "Identity not found", body = ErrorResponse),
        (status = 422, description = "Unknown status or role", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn update_identity(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateIdentityRequest>,
) -> Result<Json<MeResponse>, ServiceError> {
    let status = req
        .status
        .as_deref()
        .map(str::parse::<IdentityStatus>)
        .transpose()
        .map_err(ServiceError::Validation)?;

    let view = state
        .identity
        .update_identity(
            id,
            IdentityUpdate {
                status,
                roles: req.roles,
            },
            &user,
        )
        .await?;
    Ok(Json(view.into()))
}

/// Delete an identity
///
/// Revokes its sessions and role assignments first.
#[utoipa::path(
    delete,
    path = "/auth/admin/identities/{id}",
    params(("id" = Uuid, Path, description = "Identity id")),
    responses(
        (status = 200, description = "Deleted", body = OkResponse),
        (status = 403, description = "Missing users:manage", body = ErrorResponse),
        (status = 404, description = "Identity not found", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn delete_identity(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, ServiceError> {
    if id == user.identity_id {
        return Err(ServiceError::Validation(
            "You cannot delete your own identity".to_string(),
        ));
    }

    state.identity.delete_identity(id).await?;
    Ok(Json(OkResponse::ok()))
}

/// Approve from the emailed link
///
/// Renders a small HTML page for the approver's browser.
#[utoipa::path(
    get,
    path = "/auth/admin/approve-magic",
    params(MagicApproveQuery),
    responses(
        (status = 200, description = "Approved", content_type = "text/html", body = String),
        (status = 400, description = "Invalid or expired link", content_type = "text/html", body = String)
    ),
    tag = "Admin"
)]
pub async fn approve_magic(
    State(state): State<AppState>,
    Query(query): Query<MagicApproveQuery>,
) -> Response {
    match state.identity.approve_admin_with_token(&query.token).await {
        Ok(request) => Html(page(
            "Access approved",
            &format!("{} can now sign in to the admin console.", escape(&request.email_text)),
        ))
        .into_response(),
        Err(e @ (ServiceError::InvalidToken | ServiceError::NotFound(_))) => {
            tracing::warn!(error = %e, "Approval link rejected");
            (
                StatusCode::BAD_REQUEST,
                Html(page("Link not valid", "This approval link is invalid or has expired.")),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = ?e, "Approval link failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(page("Something went wrong", "Please try again later.")),
            )
                .into_response()
        }
    }
}

fn page(title: &str, message: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"font-family:sans-serif;text-align:center;margin-top:4rem\">\
         <h2>{title}</h2><p>{message}</p></body></html>"
    )
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
