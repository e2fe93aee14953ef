//! Identity orchestrator: sequences the OTP engine, session manager, RBAC
//! resolver and admin gate into the user-visible flows.

use chrono::Duration;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::admin_gate::{AdminGate, GateDecision, GateSettings};
use super::error::ServiceError;
use super::jwt::JwtService;
use super::metrics;
use super::notifier::{templates, Notifier};
use super::otp::{OtpEngine, OtpPolicy, OtpReceipt};
use super::rbac::{RbacResolver, MANAGE_USERS, STAFF_ROLE, SUPER_ADMIN_ROLE};
use super::session::{IssuedTokens, SessionManager};
use super::store::{CredentialStore, IdentityStore};
use crate::config::IdentityConfig;
use crate::models::{
    AdminAccessRequest, AdminRequestStatus, ApprovalActor, Identity, IdentityStatus, OtpPurpose,
    Scope, Session, SessionMeta, Target,
};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString, MIN_PASSWORD_LENGTH};
use service_core::error::AppError;

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub otp: OtpPolicy,
    pub refresh_ttl: Duration,
    pub gate: GateSettings,
}

impl IdentitySettings {
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self {
            otp: OtpPolicy {
                ttl: Duration::minutes(config.otp.expiry_minutes),
                max_attempts: config.otp.max_attempts,
            },
            refresh_ttl: Duration::days(config.jwt.refresh_token_expiry_days),
            gate: GateSettings {
                approver_email: config.admin.approver_email.clone(),
                public_base_url: config.admin.public_base_url.clone(),
            },
        }
    }
}

/// How the caller proved control of the account.
pub enum LoginProof {
    Password(Password),
    /// A consumed code for the same target and scope.
    OtpVerified(OtpReceipt),
}

impl LoginProof {
    fn method(&self) -> &'static str {
        match self {
            LoginProof::Password(_) => "password",
            LoginProof::OtpVerified(_) => "otp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub tokens: IssuedTokens,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub profile_complete: bool,
}

#[derive(Debug, Clone)]
pub enum AdminVerifyOutcome {
    PendingApproval { request_id: Uuid },
    LoggedIn(Box<LoginOutcome>),
}

/// Identity plus its current grants in its own scope.
#[derive(Debug, Clone)]
pub struct IdentityView {
    pub identity: Identity,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub profile_complete: bool,
}

/// Administrative change to another identity. Absent fields stay as they are.
#[derive(Debug, Clone, Default)]
pub struct IdentityUpdate {
    /// `active` or `inactive`.
    pub status: Option<IdentityStatus>,
    /// Replaces every role the identity holds, by name within its own scope.
    pub roles: Option<Vec<String>>,
}

/// Authenticated caller, with permissions resolved for this request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity_id: Uuid,
    pub scope: Scope,
    pub permissions: BTreeSet<String>,
    pub token_id: String,
}

impl AuthContext {
    pub fn has(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn require(&self, permission: &str) -> Result<(), ServiceError> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(ServiceError::AccessDenied(format!(
                "missing permission {}",
                permission
            )))
        }
    }
}

#[derive(Clone)]
pub struct IdentityService {
    credentials: Arc<dyn CredentialStore>,
    otp: OtpEngine,
    sessions: SessionManager,
    rbac: RbacResolver,
    gate: AdminGate,
    notifier: Arc<dyn Notifier>,
}

impl IdentityService {
    pub fn new<S: IdentityStore + 'static>(
        store: Arc<S>,
        jwt: JwtService,
        notifier: Arc<dyn Notifier>,
        settings: IdentitySettings,
    ) -> Self {
        let otp = OtpEngine::new(store.clone(), settings.otp);
        let sessions = SessionManager::new(store.clone(), jwt.clone(), settings.refresh_ttl);
        let rbac = RbacResolver::new(store.clone());
        let gate = AdminGate::new(
            store.clone(),
            otp.clone(),
            jwt,
            notifier.clone(),
            settings.gate,
        );

        Self {
            credentials: store,
            otp,
            sessions,
            rbac,
            gate,
            notifier,
        }
    }

    pub fn rbac(&self) -> &RbacResolver {
        &self.rbac
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    // --- registration ---

    /// Creates a pending identity if needed and sends a `register` code.
    #[tracing::instrument(skip(self), fields(target = %target))]
    pub async fn initiate_registration(
        &self,
        target: &Target,
        scope: Scope,
    ) -> Result<(), ServiceError> {
        reject_privileged(scope)?;

        if self.credentials.find_identity(target.as_str(), scope).await?.is_none() {
            match self
                .credentials
                .insert_identity(&Identity::new_pending(target, scope))
                .await
            {
                // Lost a race with a concurrent registration; the row exists now.
                Ok(()) | Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let code = self.otp.issue(target, OtpPurpose::Register, scope).await?;
        let (subject, body) =
            templates::verification_code(&code, self.otp.policy().ttl.num_minutes());
        self.notifier.send(target, subject, &body).await?;
        Ok(())
    }

    /// Verifies the code, activates a pending identity, assigns the scope's
    /// default role and signs in.
    #[tracing::instrument(skip(self, code, meta), fields(target = %target))]
    pub async fn complete_registration(
        &self,
        target: &Target,
        code: &str,
        scope: Scope,
        meta: &SessionMeta,
    ) -> Result<LoginOutcome, ServiceError> {
        reject_privileged(scope)?;

        let receipt = self
            .otp
            .verify(target, OtpPurpose::Register, scope, code)
            .await?;

        let identity = self
            .credentials
            .find_identity(target.as_str(), scope)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;

        if identity.status() == IdentityStatus::Pending
            && self.credentials.activate_identity(identity.identity_id).await?
        {
            tracing::info!(identity_id = %identity.identity_id, "Identity activated");
        }

        self.rbac
            .assign_default_role(identity.identity_id, scope)
            .await?;

        self.login(target, LoginProof::OtpVerified(receipt), scope, meta)
            .await
    }

    // --- login & sessions ---

    #[tracing::instrument(skip(self, proof, meta), fields(target = %target, method = proof.method()))]
    pub async fn login(
        &self,
        target: &Target,
        proof: LoginProof,
        scope: Scope,
        meta: &SessionMeta,
    ) -> Result<LoginOutcome, ServiceError> {
        let existing = self.credentials.find_identity(target.as_str(), scope).await?;

        if scope.is_privileged() {
            let approved = self.gate.is_approved(target.as_str()).await?;
            let is_super = match &existing {
                Some(identity) => {
                    self.rbac
                        .has_role(identity.identity_id, SUPER_ADMIN_ROLE, scope)
                        .await?
                }
                None => false,
            };
            if !approved && !is_super {
                return Err(ServiceError::AccessDenied(
                    "admin access has not been approved".to_string(),
                ));
            }
        }

        let identity = existing.ok_or(ServiceError::NotFound("Identity"))?;
        let method = proof.method();

        match proof {
            LoginProof::Password(password) => {
                let stored = identity
                    .password_hash
                    .clone()
                    .ok_or(ServiceError::InvalidCredentials)?;
                if !verify_password(&password, &PasswordHashString::new(stored)) {
                    return Err(ServiceError::InvalidCredentials);
                }
            }
            LoginProof::OtpVerified(receipt) => {
                if receipt.target() != target || receipt.scope() != scope {
                    return Err(ServiceError::AccessDenied(
                        "verification does not match this account".to_string(),
                    ));
                }
            }
        }

        if !identity.is_active() {
            return Err(ServiceError::Inactive);
        }

        let tokens = self
            .sessions
            .issue(identity.identity_id, scope, meta)
            .await?;
        let view = self.view_of(identity).await?;

        metrics::record_login(scope, method);
        tracing::info!(identity_id = %view.identity.identity_id, "Login succeeded");

        Ok(LoginOutcome {
            identity: view.identity,
            tokens,
            roles: view.roles,
            permissions: view.permissions,
            profile_complete: view.profile_complete,
        })
    }

    /// Rotates the refresh token. Sessions of identities that are no longer
    /// active are revoked instead.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(
        &self,
        raw_refresh_token: &str,
        meta: &SessionMeta,
    ) -> Result<IssuedTokens, ServiceError> {
        let (tokens, session) = self.sessions.redeem(raw_refresh_token, meta).await?;

        let identity = self
            .credentials
            .find_identity_by_id(session.identity_id)
            .await?;

        match identity {
            Some(identity) if identity.is_active() => Ok(tokens),
            Some(_) => {
                self.sessions.revoke(&tokens.refresh_token).await?;
                Err(ServiceError::Inactive)
            }
            None => {
                self.sessions.revoke(&tokens.refresh_token).await?;
                Err(ServiceError::InvalidToken)
            }
        }
    }

    pub async fn logout(&self, raw_refresh_token: &str) -> Result<(), ServiceError> {
        self.sessions.revoke(raw_refresh_token).await
    }

    pub async fn logout_all(&self, identity_id: Uuid) -> Result<u64, ServiceError> {
        self.sessions.revoke_all(identity_id).await
    }

    pub async fn list_sessions(&self, identity_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        self.sessions.list(identity_id).await
    }

    // --- passwords ---

    /// Overwrites any existing password. Used by OTP-only accounts.
    #[tracing::instrument(skip(self, password))]
    pub async fn set_password(
        &self,
        identity_id: Uuid,
        password: &Password,
    ) -> Result<(), ServiceError> {
        check_password_length(password)?;
        let identity = self.identity_by_id(identity_id).await?;
        self.store_password(identity.identity_id, password).await
    }

    #[tracing::instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        identity_id: Uuid,
        old_password: &Password,
        new_password: &Password,
    ) -> Result<(), ServiceError> {
        let identity = self.identity_by_id(identity_id).await?;
        let stored = identity
            .password_hash
            .clone()
            .ok_or(ServiceError::NoPasswordSet)?;

        if !verify_password(old_password, &PasswordHashString::new(stored)) {
            return Err(ServiceError::InvalidCredentials);
        }

        check_password_length(new_password)?;
        self.store_password(identity.identity_id, new_password).await
    }

    #[tracing::instrument(skip(self), fields(target = %target))]
    pub async fn forgot_password(&self, target: &Target, scope: Scope) -> Result<(), ServiceError> {
        self.credentials
            .find_identity(target.as_str(), scope)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;

        let code = self.otp.issue(target, OtpPurpose::Reset, scope).await?;
        let (subject, body) =
            templates::password_reset_code(&code, self.otp.policy().ttl.num_minutes());
        self.notifier.send(target, subject, &body).await?;
        Ok(())
    }

    /// Verifies the reset code, overwrites the password and signs out every session.
    #[tracing::instrument(skip(self, code, new_password), fields(target = %target))]
    pub async fn reset_password(
        &self,
        target: &Target,
        code: &str,
        new_password: &Password,
        scope: Scope,
    ) -> Result<(), ServiceError> {
        check_password_length(new_password)?;

        self.otp
            .verify(target, OtpPurpose::Reset, scope, code)
            .await?;

        let identity = self
            .credentials
            .find_identity(target.as_str(), scope)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;

        self.store_password(identity.identity_id, new_password).await?;
        self.sessions.revoke_all(identity.identity_id).await?;
        Ok(())
    }

    // --- profile ---

    pub async fn me(&self, identity_id: Uuid) -> Result<IdentityView, ServiceError> {
        let identity = self.identity_by_id(identity_id).await?;
        self.view_of(identity).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_profile(
        &self,
        identity_id: Uuid,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<IdentityView, ServiceError> {
        let display_name = display_name.map(str::trim);
        let identity = self
            .credentials
            .update_profile(identity_id, display_name, avatar_url)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;
        self.view_of(identity).await
    }

    // --- admin access ---

    pub async fn request_admin_access(&self, target: &Target) -> Result<(), ServiceError> {
        require_email(target)?;
        self.gate.request(target).await
    }

    /// Pending until approved; afterwards a full sign-in that creates the
    /// admin identity on first use.
    #[tracing::instrument(skip(self, code, meta), fields(target = %target))]
    pub async fn verify_admin_access(
        &self,
        target: &Target,
        code: &str,
        meta: &SessionMeta,
    ) -> Result<AdminVerifyOutcome, ServiceError> {
        require_email(target)?;

        let receipt = match self.gate.verify(target, code).await? {
            GateDecision::Pending(request) => {
                return Ok(AdminVerifyOutcome::PendingApproval {
                    request_id: request.request_id,
                })
            }
            GateDecision::Approved(receipt) => receipt,
        };

        if self
            .credentials
            .find_identity(target.as_str(), Scope::Admin)
            .await?
            .is_none()
        {
            let identity = Identity::new_active(target, Scope::Admin);
            match self.credentials.insert_identity(&identity).await {
                Ok(()) => {
                    self.rbac
                        .assign_named(identity.identity_id, STAFF_ROLE, Scope::Admin)
                        .await?;
                    tracing::info!(identity_id = %identity.identity_id, "Admin identity created");
                }
                Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let outcome = self
            .login(target, LoginProof::OtpVerified(receipt), Scope::Admin, meta)
            .await?;
        Ok(AdminVerifyOutcome::LoggedIn(Box::new(outcome)))
    }

    pub async fn approve_admin_request(
        &self,
        request_id: Uuid,
        approver: &AuthContext,
    ) -> Result<AdminAccessRequest, ServiceError> {
        approver.require(MANAGE_USERS)?;
        self.gate
            .approve(request_id, ApprovalActor::User(approver.identity_id))
            .await
    }

    pub async fn approve_admin_with_token(
        &self,
        token: &str,
    ) -> Result<AdminAccessRequest, ServiceError> {
        self.gate.approve_with_token(token).await
    }

    pub async fn list_admin_requests(
        &self,
        status: Option<AdminRequestStatus>,
    ) -> Result<Vec<AdminAccessRequest>, ServiceError> {
        self.gate.list(status).await
    }

    // --- identity management ---

    pub async fn list_identities(
        &self,
        scope: Option<Scope>,
    ) -> Result<Vec<IdentityView>, ServiceError> {
        let identities = self.credentials.list_identities(scope).await?;
        let mut views = Vec::with_capacity(identities.len());
        for identity in identities {
            views.push(self.view_of(identity).await?);
        }
        Ok(views)
    }

    /// Changes status and/or replaces roles. Deactivation signs the identity
    /// out everywhere; role names are resolved before anything is written.
    #[tracing::instrument(skip(self, update, actor), fields(actor = %actor.identity_id))]
    pub async fn update_identity(
        &self,
        identity_id: Uuid,
        update: IdentityUpdate,
        actor: &AuthContext,
    ) -> Result<IdentityView, ServiceError> {
        actor.require(MANAGE_USERS)?;
        if identity_id == actor.identity_id {
            return Err(ServiceError::Validation(
                "You cannot change your own status or roles".to_string(),
            ));
        }
        if update.status == Some(IdentityStatus::Pending) {
            return Err(ServiceError::Validation(
                "Status can only be set to active or inactive".to_string(),
            ));
        }

        let mut identity = self.identity_by_id(identity_id).await?;
        let scope = scope_of(&identity)?;

        let role_ids = match &update.roles {
            Some(names) => {
                let mut ids = Vec::with_capacity(names.len());
                for name in names {
                    let role = self.rbac.find_role(name, scope).await?.ok_or_else(|| {
                        ServiceError::Validation(format!("Unknown role {} in scope {}", name, scope))
                    })?;
                    ids.push(role.role_id);
                }
                Some(ids)
            }
            None => None,
        };

        if let Some(status) = update.status {
            identity = self
                .credentials
                .set_identity_status(identity_id, status)
                .await?
                .ok_or(ServiceError::NotFound("Identity"))?;

            if status == IdentityStatus::Inactive {
                let revoked = self.sessions.revoke_all(identity_id).await?;
                tracing::info!(%identity_id, revoked, "Identity deactivated");
            }
        }

        if let Some(role_ids) = role_ids {
            self.rbac.clear_roles(identity_id).await?;
            for role_id in role_ids {
                self.rbac.assign(identity_id, scope, role_id).await?;
            }
        }

        self.view_of(identity).await
    }

    /// Revokes sessions, clears roles and pending admin requests, then deletes.
    #[tracing::instrument(skip(self))]
    pub async fn delete_identity(&self, identity_id: Uuid) -> Result<(), ServiceError> {
        let identity = self.identity_by_id(identity_id).await?;

        self.sessions.revoke_all(identity_id).await?;
        self.rbac.clear_roles(identity_id).await?;
        if identity.scope() == Some(Scope::Admin) {
            self.gate.withdraw(&identity.target_text).await?;
        }

        if !self.credentials.delete_identity(identity_id).await? {
            return Err(ServiceError::NotFound("Identity"));
        }

        tracing::info!(%identity_id, "Identity deleted");
        Ok(())
    }

    /// Ensures `email` has an active admin identity holding the super-role.
    pub async fn bootstrap_super_admin(&self, email: &str) -> Result<Uuid, ServiceError> {
        let target = Target::parse(email).map_err(ServiceError::Validation)?;
        require_email(&target)?;

        let identity = match self
            .credentials
            .find_identity(target.as_str(), Scope::Admin)
            .await?
        {
            Some(identity) => identity,
            None => {
                let identity = Identity::new_active(&target, Scope::Admin);
                self.credentials.insert_identity(&identity).await?;
                identity
            }
        };

        if identity.status() == IdentityStatus::Pending {
            self.credentials.activate_identity(identity.identity_id).await?;
        }

        self.rbac
            .assign_named(identity.identity_id, SUPER_ADMIN_ROLE, Scope::Admin)
            .await?;

        tracing::info!(identity_id = %identity.identity_id, "Super admin ensured");
        Ok(identity.identity_id)
    }

    // --- request authorization ---

    /// Resolves a bearer token into an `AuthContext`. The declared scope, when
    /// present, must match the scope the token was issued for.
    pub async fn authorize(
        &self,
        access_token: &str,
        declared_scope: Option<Scope>,
    ) -> Result<AuthContext, ServiceError> {
        let claims = self.sessions.authenticate(access_token)?;

        if let Some(declared) = declared_scope {
            if declared != claims.scope {
                return Err(ServiceError::AccessDenied(format!(
                    "token was issued for scope {}",
                    claims.scope
                )));
            }
        }

        let identity_id = claims.identity_id().ok_or(ServiceError::InvalidToken)?;
        let identity = self
            .credentials
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if !identity.is_active() {
            return Err(ServiceError::Inactive);
        }

        let permissions = self.rbac.permissions_for(identity_id, claims.scope).await?;

        Ok(AuthContext {
            identity_id,
            scope: claims.scope,
            permissions,
            token_id: claims.jti,
        })
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.credentials.health_check().await?;
        Ok(())
    }

    // --- helpers ---

    async fn identity_by_id(&self, identity_id: Uuid) -> Result<Identity, ServiceError> {
        self.credentials
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))
    }

    async fn view_of(&self, identity: Identity) -> Result<IdentityView, ServiceError> {
        let scope = scope_of(&identity)?;

        let roles = self.rbac.role_names(identity.identity_id, scope).await?;
        let permissions = self
            .rbac
            .permissions_for(identity.identity_id, scope)
            .await?
            .into_iter()
            .collect();
        let profile_complete = identity.is_profile_complete();

        Ok(IdentityView {
            identity,
            roles,
            permissions,
            profile_complete,
        })
    }

    async fn store_password(
        &self,
        identity_id: Uuid,
        password: &Password,
    ) -> Result<(), ServiceError> {
        let hash = hash_password(password)?;
        self.credentials
            .set_password_hash(identity_id, hash.as_str())
            .await?;
        tracing::info!(%identity_id, "Password updated");
        Ok(())
    }
}

fn scope_of(identity: &Identity) -> Result<Scope, ServiceError> {
    identity.scope().ok_or_else(|| {
        ServiceError::Internal(anyhow::anyhow!(
            "Identity {} has unknown scope {}",
            identity.identity_id,
            identity.scope_code
        ))
    })
}

fn reject_privileged(scope: Scope) -> Result<(), ServiceError> {
    if scope.is_privileged() {
        return Err(ServiceError::AccessDenied(
            "admin accounts are created through an admin access request".to_string(),
        ));
    }
    Ok(())
}

fn require_email(target: &Target) -> Result<(), ServiceError> {
    if !target.is_email() {
        return Err(ServiceError::Validation(
            "admin access requires an e-mail address".to_string(),
        ));
    }
    Ok(())
}

fn check_password_length(password: &Password) -> Result<(), ServiceError> {
    if (password.as_str().chars().count() as u64) < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}
