//! Persistence seams. `Database` implements them on PostgreSQL and
//! `MemoryStore` in-process; the services only see these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    AdminAccessRequest, AdminRequestStatus, Identity, IdentityStatus, OtpCode, OtpPurpose,
    Permission, Role, Scope, Session, SessionMeta,
};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_identity(&self, target: &str, scope: Scope)
        -> Result<Option<Identity>, AppError>;

    async fn find_identity_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, AppError>;

    /// Fails with `AppError::Conflict` when (target, scope) already exists.
    async fn insert_identity(&self, identity: &Identity) -> Result<(), AppError>;

    /// Moves a `pending` identity to `active` and marks it verified.
    /// Returns false when the identity was not pending.
    async fn activate_identity(&self, identity_id: Uuid) -> Result<bool, AppError>;

    async fn set_password_hash(&self, identity_id: Uuid, password_hash: &str)
        -> Result<(), AppError>;

    /// Only the supplied fields change.
    async fn update_profile(
        &self,
        identity_id: Uuid,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Option<Identity>, AppError>;

    async fn set_identity_status(
        &self,
        identity_id: Uuid,
        status: IdentityStatus,
    ) -> Result<Option<Identity>, AppError>;

    /// Newest first; every scope when `scope` is `None`.
    async fn list_identities(&self, scope: Option<Scope>) -> Result<Vec<Identity>, AppError>;

    async fn delete_identity(&self, identity_id: Uuid) -> Result<bool, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Consumes every unconsumed code for the key of `code` and inserts `code`,
    /// atomically with respect to other issuers of the same key.
    async fn replace_active_code(&self, code: &OtpCode) -> Result<(), AppError>;

    /// Most recent unconsumed code for the key, expired or not.
    async fn latest_unconsumed_code(
        &self,
        target: &str,
        purpose: OtpPurpose,
        scope: Scope,
    ) -> Result<Option<OtpCode>, AppError>;

    /// Takes one verification attempt, atomically with the ceiling check.
    /// Returns the new attempt count, or `None` once the code is consumed or
    /// `max_attempts` have been used.
    async fn claim_attempt(&self, otp_id: Uuid, max_attempts: i32)
        -> Result<Option<i32>, AppError>;

    /// Returns false if the code had already been consumed.
    async fn consume_code(&self, otp_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), AppError>;

    /// Revokes the active session holding `old_hash` and creates its
    /// replacement in one atomic step. Exactly one concurrent caller wins;
    /// the rest get `None`. Missing metadata is inherited from the old session.
    async fn rotate_session(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expiry: DateTime<Utc>,
        meta: &SessionMeta,
    ) -> Result<Option<Session>, AppError>;

    async fn revoke_session(&self, token_hash: &str) -> Result<(), AppError>;

    async fn revoke_all_sessions(&self, identity_id: Uuid) -> Result<u64, AppError>;

    async fn list_active_sessions(&self, identity_id: Uuid) -> Result<Vec<Session>, AppError>;
}

#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn find_role(&self, name: &str, scope: Scope) -> Result<Option<Role>, AppError>;

    async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, AppError>;

    /// Returns the existing role when (name, scope) is already present.
    async fn upsert_role(&self, name: &str, scope: Scope) -> Result<Role, AppError>;

    async fn find_permission(&self, slug: &str, scope: Scope)
        -> Result<Option<Permission>, AppError>;

    /// Returns the existing permission when (scope, slug) is already present.
    async fn upsert_permission(&self, slug: &str, scope: Scope) -> Result<Permission, AppError>;

    async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError>;

    async fn revoke_permission(&self, role_id: Uuid, permission_id: Uuid)
        -> Result<(), AppError>;

    /// Returns false when the identity already held the role.
    async fn assign_role(&self, identity_id: Uuid, role_id: Uuid) -> Result<bool, AppError>;

    async fn clear_roles(&self, identity_id: Uuid) -> Result<(), AppError>;

    async fn roles_for(&self, identity_id: Uuid, scope: Scope) -> Result<Vec<Role>, AppError>;

    /// Distinct permission slugs across every role the identity holds in `scope`.
    async fn permissions_for(&self, identity_id: Uuid, scope: Scope)
        -> Result<Vec<String>, AppError>;
}

/// Result of flipping a request to approved.
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    Approved(AdminAccessRequest),
    AlreadyApproved(AdminAccessRequest),
    NotFound,
}

#[async_trait]
pub trait AdminRequestStore: Send + Sync {
    async fn find_admin_request(&self, email: &str)
        -> Result<Option<AdminAccessRequest>, AppError>;

    async fn find_admin_request_by_id(
        &self,
        request_id: Uuid,
    ) -> Result<Option<AdminAccessRequest>, AppError>;

    /// Creates a pending request for `email`, or returns the existing row
    /// unchanged in status (a pending row has its request time refreshed).
    async fn upsert_pending_request(
        &self,
        email: &str,
        scope: Scope,
    ) -> Result<AdminAccessRequest, AppError>;

    async fn approve_request(
        &self,
        request_id: Uuid,
        approved_by: &str,
    ) -> Result<ApprovalOutcome, AppError>;

    async fn delete_pending_requests(&self, email: &str) -> Result<u64, AppError>;

    async fn list_admin_requests(
        &self,
        status: Option<AdminRequestStatus>,
    ) -> Result<Vec<AdminAccessRequest>, AppError>;
}

/// Everything the identity core persists.
pub trait IdentityStore:
    CredentialStore + OtpStore + SessionStore + RbacStore + AdminRequestStore
{
}

impl<T> IdentityStore for T where
    T: CredentialStore + OtpStore + SessionStore + RbacStore + AdminRequestStore
{
}
