//! Services layer for identity-service.
//!
//! Stores sit behind traits in `store`; the engines built on them are
//! composed by `IdentityService`.

pub mod admin_gate;
mod database;
pub mod error;
pub mod identity;
pub mod jwt;
mod memory;
pub mod metrics;
pub mod notifier;
pub mod otp;
pub mod rbac;
pub mod session;
pub mod store;

pub use admin_gate::{AdminGate, GateDecision, GateSettings};
pub use database::Database;
pub use error::ServiceError;
pub use identity::{
    AdminVerifyOutcome, AuthContext, IdentityService, IdentitySettings, IdentityUpdate,
    IdentityView, LoginOutcome, LoginProof,
};
pub use jwt::{AccessTokenClaims, ApprovalClaims, JwtService};
pub use memory::MemoryStore;
pub use notifier::{EmailNotifier, MockNotifier, Notifier, SentMessage};
pub use otp::{OtpEngine, OtpPolicy, OtpReceipt};
pub use rbac::RbacResolver;
pub use session::{IssuedTokens, SessionManager};
pub use store::IdentityStore;
