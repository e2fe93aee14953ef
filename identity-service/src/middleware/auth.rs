use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::models::{Scope, SCOPE_HEADER};
use crate::services::{AuthContext, ServiceError};
use crate::AppState;

/// Middleware to require a bearer access token.
///
/// Permissions are resolved from the current role graph on every request and
/// attached as an `AuthContext` extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ServiceError::InvalidToken)?;

    let declared_scope = declared_scope(req.headers())?;

    let context = state.identity.authorize(token, declared_scope).await?;

    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

/// Must run after `auth_middleware`.
pub async fn require_permission(
    permission: &'static str,
    req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let context = req
        .extensions()
        .get::<AuthContext>()
        .ok_or(ServiceError::InvalidToken)?;

    if let Err(e) = context.require(permission) {
        tracing::warn!(
            identity_id = %context.identity_id,
            required = permission,
            "Permission denied"
        );
        return Err(e);
    }

    Ok(next.run(req).await)
}

/// Optional `x-app-scope` header; present but unknown is an error.
pub(crate) fn declared_scope(
    headers: &axum::http::HeaderMap,
) -> Result<Option<Scope>, ServiceError> {
    match headers.get(SCOPE_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Some)
            .ok_or_else(|| {
                ServiceError::Validation(format!("Invalid {} header", SCOPE_HEADER))
            }),
    }
}

/// Extractor for the authenticated caller
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<AuthContext>()
            .ok_or(ServiceError::InvalidToken)?;

        Ok(AuthUser(context.clone()))
    }
}
