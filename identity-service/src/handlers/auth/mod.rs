pub mod otp;
pub mod password;
pub mod profile;
pub mod session;

pub use otp::{send_otp, verify_otp};
pub use password::{change_password, forgot_password, reset_password, set_password};
pub use profile::{me, update_profile};
pub use session::{list_sessions, login, logout, logout_all, refresh};

use crate::models::Target;
use crate::services::ServiceError;

/// Normalised target from an already validated request field.
pub(crate) fn parse_target(raw: &str) -> Result<Target, ServiceError> {
    Target::parse(raw).map_err(ServiceError::Validation)
}
