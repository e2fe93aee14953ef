//! Request extractors for the caller-declared scope and client metadata.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use service_core::middleware::rate_limit::client_ip;
use std::net::SocketAddr;

use super::auth::declared_scope;
use crate::models::{Scope, SessionMeta, SCOPE_HEADER};
use crate::services::ServiceError;

pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Required `x-app-scope` header.
#[derive(Debug, Clone, Copy)]
pub struct AppScope(pub Scope);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AppScope
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        declared_scope(&parts.headers)?
            .map(AppScope)
            .ok_or_else(|| ServiceError::Validation(format!("Missing {} header", SCOPE_HEADER)))
    }
}

/// Device, IP and user agent recorded on new sessions.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta(pub SessionMeta);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_text = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.chars().take(512).collect::<String>())
                .filter(|s| !s.is_empty())
        };

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientMeta(SessionMeta {
            device_id: header_text(DEVICE_ID_HEADER),
            user_agent: header_text(header::USER_AGENT.as_str()),
            ip_address: client_ip(&parts.headers, peer).map(|ip| ip.to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_client_meta_from_headers() {
        let (mut parts, _) = Request::builder()
            .header("user-agent", "curl/8.0")
            .header(DEVICE_ID_HEADER, "phone-1")
            .header("x-forwarded-for", "198.51.100.4")
            .body(())
            .unwrap()
            .into_parts();

        let ClientMeta(meta) = ClientMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(meta.device_id.as_deref(), Some("phone-1"));
        assert_eq!(meta.ip_address.as_deref(), Some("198.51.100.4"));
    }

    #[tokio::test]
    async fn test_app_scope_accepts_legacy_codes() {
        let (mut parts, _) = Request::builder()
            .header(SCOPE_HEADER, "utb")
            .body(())
            .unwrap()
            .into_parts();

        let AppScope(scope) = AppScope::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(scope, Scope::Merchant);
    }

    #[tokio::test]
    async fn test_app_scope_missing_or_unknown() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        assert!(AppScope::from_request_parts(&mut parts, &()).await.is_err());

        let (mut parts, _) = Request::builder()
            .header(SCOPE_HEADER, "partner")
            .body(())
            .unwrap()
            .into_parts();
        assert!(matches!(
            AppScope::from_request_parts(&mut parts, &()).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
