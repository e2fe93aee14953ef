pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{get, post, put},
    Json, Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter, KeyedRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Environment, IdentityConfig, SwaggerMode};
use crate::models::SCOPE_HEADER;
use crate::services::{rbac::MANAGE_USERS, IdentityService, ServiceError};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::metrics::metrics,
        handlers::auth::otp::send_otp,
        handlers::auth::otp::verify_otp,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::logout,
        handlers::auth::session::logout_all,
        handlers::auth::session::list_sessions,
        handlers::auth::password::forgot_password,
        handlers::auth::password::reset_password,
        handlers::auth::password::set_password,
        handlers::auth::password::change_password,
        handlers::auth::profile::me,
        handlers::auth::profile::update_profile,
        handlers::admin::request_access,
        handlers::admin::verify_access,
        handlers::admin::list_requests,
        handlers::admin::approve_request,
        handlers::admin::list_identities,
        handlers::admin::update_identity,
        handlers::admin::delete_identity,
        handlers::admin::approve_magic,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::OkResponse,
            dtos::auth::SendOtpRequest,
            dtos::auth::VerifyOtpRequest,
            dtos::auth::LoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::LogoutRequest,
            dtos::auth::ForgotPasswordRequest,
            dtos::auth::ResetPasswordRequest,
            dtos::auth::SetPasswordRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::UpdateProfileRequest,
            dtos::auth::LoginResponse,
            dtos::auth::MeResponse,
            dtos::auth::SessionsResponse,
            dtos::auth::LogoutAllResponse,
            dtos::admin::AdminAccessRequestBody,
            dtos::admin::AdminVerifyRequest,
            dtos::admin::PendingApprovalResponse,
            dtos::admin::AdminVerifyResponse,
            dtos::admin::AdminRequestsResponse,
            dtos::admin::ApproveResponse,
            dtos::admin::UpdateIdentityRequest,
            dtos::admin::IdentitiesResponse,
            services::IssuedTokens,
            models::SanitizedIdentity,
            models::SessionInfo,
            models::AdminRequestView,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "OTP registration, login and token rotation"),
        (name = "Sessions", description = "Active refresh sessions of the caller"),
        (name = "Password", description = "Password set, change and reset"),
        (name = "Profile", description = "Caller identity and profile"),
        (name = "Admin", description = "Admin access requests and identity management"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub identity: IdentityService,
    /// Keyed by scope and delivery target.
    pub otp_send_limiter: KeyedRateLimiter,
    pub login_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub fn build_router(state: AppState) -> Router {
    // Code verification and password checks share the login limiter
    let login_limiter = state.login_rate_limiter.clone();
    let credential_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/otp/verify", post(handlers::auth::verify_otp))
        .route("/auth/password/reset", post(handlers::auth::reset_password))
        .route("/auth/admin/verify", post(handlers::admin::verify_access))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let bearer_routes = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/profile", put(handlers::auth::update_profile))
        .route("/auth/password/set", post(handlers::auth::set_password))
        .route("/auth/password/change", post(handlers::auth::change_password))
        .route("/auth/sessions", get(handlers::auth::list_sessions))
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    // Layers run bottom-up: the token is resolved before the permission check
    let admin_routes = Router::new()
        .route("/auth/admin/requests", get(handlers::admin::list_requests))
        .route(
            "/auth/admin/requests/:id/approve",
            post(handlers::admin::approve_request),
        )
        .route(
            "/auth/admin/identities",
            get(handlers::admin::list_identities),
        )
        .route(
            "/auth/admin/identities/:id",
            put(handlers::admin::update_identity).delete(handlers::admin::delete_identity),
        )
        .layer(from_fn(|req: Request, next: Next| {
            middleware::require_permission(MANAGE_USERS, req, next)
        }))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled = match state.config.environment {
        Environment::Dev => true,
        Environment::Prod => state.config.swagger.enabled == SwaggerMode::Public,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // OpenAPI JSON stays available for programmatic clients
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    app.route("/auth/otp/send", post(handlers::auth::send_otp))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/password/forgot", post(handlers::auth::forgot_password))
        .route("/auth/admin/request", post(handlers::admin::request_access))
        .route("/auth/admin/approve-magic", get(handlers::admin::approve_magic))
        .merge(credential_routes)
        .merge(bearer_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins(&state.config.security.allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    HeaderName::from_static(SCOPE_HEADER),
                    HeaderName::from_static(middleware::extract::DEVICE_ID_HEADER),
                ]),
        )
}

/// `*` (allowed outside prod only) opens CORS to any origin; unparsable
/// entries are dropped.
fn allowed_origins(origins: &[String]) -> AllowOrigin {
    if origins.iter().any(|o| o == "*") {
        return AllowOrigin::any();
    }

    AllowOrigin::list(origins.iter().filter_map(|o| {
        o.parse::<HeaderValue>()
            .map_err(|e| tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e))
            .ok()
    }))
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Storage is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    state.identity.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Storage health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "storage": "up"
        }
    })))
}
