//! Domain models for identity-service.

mod admin_request;
mod identity;
mod otp_code;
mod role;
mod scope;
mod session;
mod target;

pub use admin_request::{AdminAccessRequest, AdminRequestStatus, AdminRequestView, ApprovalActor};
pub use identity::{Identity, IdentityStatus, SanitizedIdentity};
pub use otp_code::{OtpCode, OtpPurpose};
pub use role::{Permission, Role};
pub use scope::{Scope, SCOPE_HEADER};
pub use session::{Session, SessionInfo, SessionMeta};
pub use target::Target;
