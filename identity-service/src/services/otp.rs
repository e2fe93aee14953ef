//! One-time code engine: issue, verify, consume.

use chrono::{Duration, Utc};
use std::sync::Arc;

use super::error::ServiceError;
use super::metrics;
use super::store::OtpStore;
use crate::models::{OtpCode, OtpPurpose, Scope, Target};
use crate::utils::{digests_match, generate_numeric_code, hash_token};

#[derive(Debug, Clone, Copy)]
pub struct OtpPolicy {
    pub ttl: Duration,
    /// Failed attempts after which the code is dead until a new one is issued.
    pub max_attempts: i32,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(10),
            max_attempts: 5,
        }
    }
}

/// Proof that a code for (target, purpose, scope) was verified and consumed.
/// Only the engine can construct one.
#[derive(Debug, Clone)]
pub struct OtpReceipt {
    target: Target,
    purpose: OtpPurpose,
    scope: Scope,
}

impl OtpReceipt {
    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn purpose(&self) -> OtpPurpose {
        self.purpose
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }
}

#[derive(Clone)]
pub struct OtpEngine {
    store: Arc<dyn OtpStore>,
    policy: OtpPolicy,
}

impl OtpEngine {
    pub fn new(store: Arc<dyn OtpStore>, policy: OtpPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> OtpPolicy {
        self.policy
    }

    /// Supersedes any active code for the key and returns the new raw code.
    /// Only its hash is persisted.
    #[tracing::instrument(skip(self), fields(target = %target))]
    pub async fn issue(
        &self,
        target: &Target,
        purpose: OtpPurpose,
        scope: Scope,
    ) -> Result<String, ServiceError> {
        let code = generate_numeric_code();
        let record = OtpCode::new(target, purpose, scope, hash_token(&code), self.policy.ttl);

        self.store.replace_active_code(&record).await?;

        metrics::record_otp_issued(purpose, scope);
        tracing::info!(otp_id = %record.otp_id, "Verification code issued");

        Ok(code)
    }

    #[tracing::instrument(skip(self, code), fields(target = %target))]
    pub async fn verify(
        &self,
        target: &Target,
        purpose: OtpPurpose,
        scope: Scope,
        code: &str,
    ) -> Result<OtpReceipt, ServiceError> {
        let Some(record) = self
            .store
            .latest_unconsumed_code(target.as_str(), purpose, scope)
            .await?
        else {
            metrics::record_otp_failure("not_found");
            return Err(ServiceError::NotFound("Verification code"));
        };

        if record.is_expired_at(Utc::now()) {
            metrics::record_otp_failure("expired");
            return Err(ServiceError::Expired);
        }

        // Every comparison, right or wrong, spends an attempt first.
        let Some(attempts) = self
            .store
            .claim_attempt(record.otp_id, self.policy.max_attempts)
            .await?
        else {
            metrics::record_otp_failure("too_many_attempts");
            return Err(ServiceError::TooManyAttempts);
        };

        if !digests_match(&hash_token(code), &record.code_hash) {
            metrics::record_otp_failure("invalid_code");
            tracing::info!(otp_id = %record.otp_id, attempts, "Verification code mismatch");
            return Err(ServiceError::InvalidCode);
        }

        // A concurrent verifier may have consumed it between load and here.
        if !self.store.consume_code(record.otp_id).await? {
            metrics::record_otp_failure("not_found");
            return Err(ServiceError::NotFound("Verification code"));
        }

        Ok(OtpReceipt {
            target: target.clone(),
            purpose,
            scope,
        })
    }
}
