//! Shared setup for identity-service integration tests.
//!
//! Every test gets its own in-memory store and a recording notifier, so
//! delivered codes and approval links can be read back.

#![allow(dead_code)]

use identity_service::{
    build_router,
    config::{
        AdminConfig, DatabaseConfig, Environment, IdentityConfig, JwtConfig, OtpConfig,
        RateLimitConfig, SecurityConfig, SmtpConfig, SwaggerConfig, SwaggerMode,
    },
    models::{Scope, SessionMeta, Target},
    services::{
        IdentityService, IdentitySettings, JwtService, LoginOutcome, LoginProof, MemoryStore,
        MockNotifier,
    },
    utils::Password,
    AppState,
};
use service_core::axum::Router;
use service_core::middleware::rate_limit::{create_ip_rate_limiter, create_keyed_rate_limiter};
use std::sync::Arc;

pub const TEST_SECRET: &str = "integration-test-secret-with-enough-length";
pub const APPROVER: &str = "approver@example.com";
pub const BASE_URL: &str = "http://identity.test";

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        database: DatabaseConfig {
            url: None,
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: Some(TEST_SECRET.to_string()),
            ..JwtConfig::default()
        },
        otp: OtpConfig {
            expiry_minutes: 10,
            max_attempts: 5,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            user: None,
            password: None,
            from: "no-reply@example.com".to_string(),
        },
        admin: AdminConfig {
            approver_email: APPROVER.to_string(),
            public_base_url: BASE_URL.to_string(),
            bootstrap_super_admin_email: None,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Public,
        },
        rate_limit: RateLimitConfig {
            otp_send_attempts: 3,
            otp_send_window_seconds: 900,
            login_attempts: 50,
            login_window_seconds: 900,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<MockNotifier>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: IdentityConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(MockNotifier::new());
        let jwt = JwtService::from_secret(TEST_SECRET).expect("jwt service");

        let identity = IdentityService::new(
            store.clone(),
            jwt,
            notifier.clone(),
            IdentitySettings::from_config(&config),
        );
        identity
            .rbac()
            .ensure_catalog()
            .await
            .expect("role catalog");

        let state = AppState {
            otp_send_limiter: create_keyed_rate_limiter(
                config.rate_limit.otp_send_attempts,
                config.rate_limit.otp_send_window_seconds,
            ),
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.global_ip_limit,
                config.rate_limit.global_ip_window_seconds,
            ),
            config,
            identity,
        };

        Self {
            state,
            store,
            notifier,
        }
    }

    pub fn identity(&self) -> &IdentityService {
        &self.state.identity
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn last_code(&self, to: &str) -> String {
        self.notifier
            .last_code_for(to)
            .unwrap_or_else(|| panic!("no code delivered to {}", to))
    }

    /// OTP registration from send to verify; returns the first sign-in.
    pub async fn register(&self, raw_target: &str, scope: Scope) -> LoginOutcome {
        let target = target(raw_target);
        self.identity()
            .initiate_registration(&target, scope)
            .await
            .expect("initiate registration");
        let code = self.last_code(raw_target);
        self.identity()
            .complete_registration(&target, &code, scope, &meta())
            .await
            .expect("complete registration")
    }

    /// Active admin identity holding the super-role, signed in with a password.
    pub async fn super_admin(&self, email: &str) -> LoginOutcome {
        let id = self
            .identity()
            .bootstrap_super_admin(email)
            .await
            .expect("bootstrap super admin");
        let password = Password::new("super-secret-1");
        self.identity()
            .set_password(id, &password)
            .await
            .expect("set password");
        self.identity()
            .login(
                &target(email),
                LoginProof::Password(password),
                Scope::Admin,
                &meta(),
            )
            .await
            .expect("super admin login")
    }
}

pub fn target(raw: &str) -> Target {
    Target::parse(raw).expect("valid target")
}

pub fn meta() -> SessionMeta {
    SessionMeta {
        device_id: Some("test-device".to_string()),
        ip_address: Some("127.0.0.1".to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}
