//! OTP code model - hashed one-time codes keyed by (target, purpose, scope).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Scope, Target};

/// OTP purpose codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Register,
    AdminRequest,
    Reset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Register => "register",
            OtpPurpose::AdminRequest => "admin_request",
            OtpPurpose::Reset => "reset",
        }
    }
}

/// OTP code entity. Only the hash of the code is stored.
#[derive(Debug, Clone, FromRow)]
pub struct OtpCode {
    pub otp_id: Uuid,
    pub target_text: String,
    pub purpose_code: String,
    pub scope_code: String,
    pub code_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub attempt_count: i32,
    pub consumed_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl OtpCode {
    pub fn new(
        target: &Target,
        purpose: OtpPurpose,
        scope: Scope,
        code_hash: String,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            otp_id: Uuid::new_v4(),
            target_text: target.as_str().to_string(),
            purpose_code: purpose.as_str().to_string(),
            scope_code: scope.as_str().to_string(),
            code_hash,
            expiry_utc: now + ttl,
            attempt_count: 0,
            consumed_utc: None,
            created_utc: now,
        }
    }

    pub fn matches_key(&self, target: &str, purpose: OtpPurpose, scope: Scope) -> bool {
        self.target_text == target
            && self.purpose_code == purpose.as_str()
            && self.scope_code == scope.as_str()
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_utc.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }

    /// Unconsumed and unexpired.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_consumed() && !self.is_expired_at(now)
    }
}
