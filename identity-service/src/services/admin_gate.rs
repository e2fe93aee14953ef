//! Human approval workflow for the privileged scope.
//!
//! none -> pending -> approved. There is no way back to pending.

use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use super::jwt::JwtService;
use super::metrics;
use super::notifier::{templates, Notifier};
use super::otp::{OtpEngine, OtpReceipt};
use super::store::{AdminRequestStore, ApprovalOutcome};
use crate::models::{
    AdminAccessRequest, AdminRequestStatus, ApprovalActor, OtpPurpose, Scope, Target,
};

#[derive(Debug, Clone)]
pub struct GateSettings {
    pub approver_email: String,
    pub public_base_url: String,
}

/// Result of verifying an admin-access code.
#[derive(Debug)]
pub enum GateDecision {
    /// Already approved; the receipt may be used to sign in.
    Approved(OtpReceipt),
    /// Awaiting a human approver.
    Pending(AdminAccessRequest),
}

#[derive(Clone)]
pub struct AdminGate {
    store: Arc<dyn AdminRequestStore>,
    otp: OtpEngine,
    jwt: JwtService,
    notifier: Arc<dyn Notifier>,
    settings: GateSettings,
}

impl AdminGate {
    pub fn new(
        store: Arc<dyn AdminRequestStore>,
        otp: OtpEngine,
        jwt: JwtService,
        notifier: Arc<dyn Notifier>,
        settings: GateSettings,
    ) -> Self {
        Self {
            store,
            otp,
            jwt,
            notifier,
            settings,
        }
    }

    /// Sends an `admin_request` code. Request state is not touched.
    #[tracing::instrument(skip(self), fields(target = %email))]
    pub async fn request(&self, email: &Target) -> Result<(), ServiceError> {
        let code = self
            .otp
            .issue(email, OtpPurpose::AdminRequest, Scope::Admin)
            .await?;

        let (subject, body) =
            templates::admin_verification_code(&code, self.otp.policy().ttl.num_minutes());
        self.notifier.send(email, subject, &body).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, code), fields(target = %email))]
    pub async fn verify(&self, email: &Target, code: &str) -> Result<GateDecision, ServiceError> {
        let receipt = self
            .otp
            .verify(email, OtpPurpose::AdminRequest, Scope::Admin, code)
            .await?;

        if let Some(existing) = self.store.find_admin_request(email.as_str()).await? {
            if existing.is_approved() {
                metrics::record_admin_request("already_approved");
                return Ok(GateDecision::Approved(receipt));
            }
        }

        let request = self
            .store
            .upsert_pending_request(email.as_str(), Scope::Admin)
            .await?;

        let token = self
            .jwt
            .generate_approval_token(request.request_id, &request.email_text, Scope::Admin)?;
        let link = format!(
            "{}/auth/admin/approve-magic?token={}",
            self.settings.public_base_url, token
        );

        let approver = Target::Email(self.settings.approver_email.clone());
        let (subject, body) = templates::approval_request(&request.email_text, &link);
        if let Err(e) = self.notifier.send(&approver, subject, &body).await {
            // Still recorded and listable; approver can act from the list.
            tracing::error!(error = %e, request_id = %request.request_id, "Failed to notify approver");
        }

        metrics::record_admin_request("pending");
        tracing::info!(request_id = %request.request_id, "Admin access request pending approval");

        Ok(GateDecision::Pending(request))
    }

    pub async fn is_approved(&self, email: &str) -> Result<bool, ServiceError> {
        Ok(self
            .store
            .find_admin_request(email)
            .await?
            .is_some_and(|r| r.is_approved()))
    }

    /// Idempotent: approving twice notifies the requester once.
    #[tracing::instrument(skip(self))]
    pub async fn approve(
        &self,
        request_id: Uuid,
        actor: ApprovalActor,
    ) -> Result<AdminAccessRequest, ServiceError> {
        match self
            .store
            .approve_request(request_id, &actor.audit_label())
            .await?
        {
            ApprovalOutcome::Approved(request) => {
                metrics::record_admin_request("approved");
                tracing::info!(
                    approved_by = %actor.audit_label(),
                    email = %request.email_text,
                    "Admin access request approved"
                );

                let requester = Target::Email(request.email_text.clone());
                let (subject, body) = templates::access_approved();
                if let Err(e) = self.notifier.send(&requester, subject, &body).await {
                    tracing::error!(error = %e, "Failed to notify requester of approval");
                }
                Ok(request)
            }
            ApprovalOutcome::AlreadyApproved(request) => Ok(request),
            ApprovalOutcome::NotFound => Err(ServiceError::NotFound("Admin access request")),
        }
    }

    /// Approval through the signed link, on behalf of the system actor.
    #[tracing::instrument(skip_all)]
    pub async fn approve_with_token(&self, token: &str) -> Result<AdminAccessRequest, ServiceError> {
        let claims = self.jwt.validate_approval_token(token).map_err(|e| {
            tracing::warn!(error = %e, "Approval token rejected");
            ServiceError::InvalidToken
        })?;

        let request = self
            .store
            .find_admin_request_by_id(claims.request_id)
            .await?
            .ok_or(ServiceError::NotFound("Admin access request"))?;

        if request.email_text != claims.email || claims.scope != Scope::Admin {
            return Err(ServiceError::InvalidToken);
        }

        self.approve(request.request_id, ApprovalActor::System).await
    }

    pub async fn list(
        &self,
        status: Option<AdminRequestStatus>,
    ) -> Result<Vec<AdminAccessRequest>, ServiceError> {
        Ok(self.store.list_admin_requests(status).await?)
    }

    /// Drops pending requests for `email`; approved ones stay.
    pub async fn withdraw(&self, email: &str) -> Result<u64, ServiceError> {
        Ok(self.store.delete_pending_requests(email).await?)
    }
}
