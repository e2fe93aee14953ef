//! In-process implementation of every store trait.
//!
//! All state sits behind one mutex, so each trait call is atomic. That gives
//! OTP replacement and refresh rotation the same single-winner guarantees the
//! PostgreSQL implementation gets from transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    AdminAccessRequest, AdminRequestStatus, Identity, IdentityStatus, OtpCode, OtpPurpose,
    Permission, Role, Scope, Session, SessionMeta,
};
use crate::services::store::{
    AdminRequestStore, ApprovalOutcome, CredentialStore, OtpStore, RbacStore, SessionStore,
};

#[derive(Default)]
struct MemoryState {
    identities: HashMap<Uuid, Identity>,
    otp_codes: Vec<OtpCode>,
    sessions: HashMap<String, Session>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    role_permissions: HashSet<(Uuid, Uuid)>,
    assignments: HashSet<(Uuid, Uuid)>,
    admin_requests: HashMap<Uuid, AdminAccessRequest>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Memory store mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_identity(
        &self,
        target: &str,
        scope: Scope,
    ) -> Result<Option<Identity>, AppError> {
        let state = self.lock()?;
        Ok(state
            .identities
            .values()
            .find(|i| i.target_text == target && i.scope_code == scope.as_str())
            .cloned())
    }

    async fn find_identity_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, AppError> {
        Ok(self.lock()?.identities.get(&identity_id).cloned())
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), AppError> {
        let mut state = self.lock()?;
        let duplicate = state.identities.values().any(|i| {
            i.target_text == identity.target_text && i.scope_code == identity.scope_code
        });
        if duplicate || state.identities.contains_key(&identity.identity_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Identity already exists for this target in scope {}",
                identity.scope_code
            )));
        }
        state.identities.insert(identity.identity_id, identity.clone());
        Ok(())
    }

    async fn activate_identity(&self, identity_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        match state.identities.get_mut(&identity_id) {
            Some(identity) if identity.status() == IdentityStatus::Pending => {
                identity.status_code = IdentityStatus::Active.as_str().to_string();
                identity.email_verified = true;
                identity.updated_utc = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        let mut state = self.lock()?;
        if let Some(identity) = state.identities.get_mut(&identity_id) {
            identity.password_hash = Some(password_hash.to_string());
            identity.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        identity_id: Uuid,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Option<Identity>, AppError> {
        let mut state = self.lock()?;
        Ok(state.identities.get_mut(&identity_id).map(|identity| {
            if let Some(name) = display_name {
                identity.display_name = Some(name.to_string());
            }
            if let Some(url) = avatar_url {
                identity.avatar_url = Some(url.to_string());
            }
            identity.updated_utc = Utc::now();
            identity.clone()
        }))
    }

    async fn set_identity_status(
        &self,
        identity_id: Uuid,
        status: IdentityStatus,
    ) -> Result<Option<Identity>, AppError> {
        let mut state = self.lock()?;
        Ok(state.identities.get_mut(&identity_id).map(|identity| {
            identity.status_code = status.as_str().to_string();
            identity.updated_utc = Utc::now();
            identity.clone()
        }))
    }

    async fn list_identities(&self, scope: Option<Scope>) -> Result<Vec<Identity>, AppError> {
        let state = self.lock()?;
        let mut identities: Vec<Identity> = state
            .identities
            .values()
            .filter(|i| scope.map_or(true, |s| i.scope_code == s.as_str()))
            .cloned()
            .collect();
        identities.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(identities)
    }

    async fn delete_identity(&self, identity_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        let removed = state.identities.remove(&identity_id).is_some();
        if removed {
            state.sessions.retain(|_, s| s.identity_id != identity_id);
            state.assignments.retain(|(id, _)| *id != identity_id);
        }
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn replace_active_code(&self, code: &OtpCode) -> Result<(), AppError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        for existing in state.otp_codes.iter_mut().filter(|c| {
            c.target_text == code.target_text
                && c.purpose_code == code.purpose_code
                && c.scope_code == code.scope_code
                && c.consumed_utc.is_none()
        }) {
            existing.consumed_utc = Some(now);
        }
        state.otp_codes.push(code.clone());
        Ok(())
    }

    async fn latest_unconsumed_code(
        &self,
        target: &str,
        purpose: OtpPurpose,
        scope: Scope,
    ) -> Result<Option<OtpCode>, AppError> {
        let state = self.lock()?;
        Ok(state
            .otp_codes
            .iter()
            .filter(|c| c.matches_key(target, purpose, scope) && !c.is_consumed())
            .max_by_key(|c| c.created_utc)
            .cloned())
    }

    async fn claim_attempt(
        &self,
        otp_id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<i32>, AppError> {
        let mut state = self.lock()?;
        Ok(state
            .otp_codes
            .iter_mut()
            .find(|c| {
                c.otp_id == otp_id && c.consumed_utc.is_none() && c.attempt_count < max_attempts
            })
            .map(|code| {
                code.attempt_count += 1;
                code.attempt_count
            }))
    }

    async fn consume_code(&self, otp_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        match state
            .otp_codes
            .iter_mut()
            .find(|c| c.otp_id == otp_id && c.consumed_utc.is_none())
        {
            Some(code) => {
                code.consumed_utc = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        let mut state = self.lock()?;
        if state.sessions.contains_key(&session.refresh_token_hash) {
            return Err(AppError::Conflict(anyhow::anyhow!("Duplicate refresh token hash")));
        }
        state
            .sessions
            .insert(session.refresh_token_hash.clone(), session.clone());
        Ok(())
    }

    async fn rotate_session(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expiry: DateTime<Utc>,
        meta: &SessionMeta,
    ) -> Result<Option<Session>, AppError> {
        let mut state = self.lock()?;
        let now = Utc::now();

        let old = match state.sessions.get_mut(old_hash) {
            Some(session) if session.is_active_at(now) => {
                session.revoked_utc = Some(now);
                session.clone()
            }
            _ => return Ok(None),
        };

        let replacement = Session {
            session_id: Uuid::new_v4(),
            identity_id: old.identity_id,
            scope_code: old.scope_code.clone(),
            refresh_token_hash: new_hash.to_string(),
            device_id: meta.device_id.clone().or(old.device_id),
            ip_address: meta.ip_address.clone().or(old.ip_address),
            user_agent: meta.user_agent.clone().or(old.user_agent),
            expiry_utc: new_expiry,
            revoked_utc: None,
            created_utc: now,
        };
        state
            .sessions
            .insert(replacement.refresh_token_hash.clone(), replacement.clone());
        Ok(Some(replacement))
    }

    async fn revoke_session(&self, token_hash: &str) -> Result<(), AppError> {
        let mut state = self.lock()?;
        if let Some(session) = state.sessions.get_mut(token_hash) {
            if session.revoked_utc.is_none() {
                session.revoked_utc = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn revoke_all_sessions(&self, identity_id: Uuid) -> Result<u64, AppError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut revoked = 0;
        for session in state
            .sessions
            .values_mut()
            .filter(|s| s.identity_id == identity_id && s.revoked_utc.is_none())
        {
            session.revoked_utc = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn list_active_sessions(&self, identity_id: Uuid) -> Result<Vec<Session>, AppError> {
        let state = self.lock()?;
        let now = Utc::now();
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.identity_id == identity_id && s.is_active_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(sessions)
    }
}

#[async_trait]
impl RbacStore for MemoryStore {
    async fn find_role(&self, name: &str, scope: Scope) -> Result<Option<Role>, AppError> {
        let state = self.lock()?;
        Ok(state
            .roles
            .values()
            .find(|r| r.role_name == name && r.scope_code == scope.as_str())
            .cloned())
    }

    async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, AppError> {
        Ok(self.lock()?.roles.get(&role_id).cloned())
    }

    async fn upsert_role(&self, name: &str, scope: Scope) -> Result<Role, AppError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .roles
            .values()
            .find(|r| r.role_name == name && r.scope_code == scope.as_str())
        {
            return Ok(existing.clone());
        }
        let role = Role::new(name, scope);
        state.roles.insert(role.role_id, role.clone());
        Ok(role)
    }

    async fn find_permission(
        &self,
        slug: &str,
        scope: Scope,
    ) -> Result<Option<Permission>, AppError> {
        let state = self.lock()?;
        Ok(state
            .permissions
            .values()
            .find(|p| p.permission_slug == slug && p.scope_code == scope.as_str())
            .cloned())
    }

    async fn upsert_permission(&self, slug: &str, scope: Scope) -> Result<Permission, AppError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .permissions
            .values()
            .find(|p| p.permission_slug == slug && p.scope_code == scope.as_str())
        {
            return Ok(existing.clone());
        }
        let permission = Permission::new(slug, scope);
        state
            .permissions
            .insert(permission.permission_id, permission.clone());
        Ok(permission)
    }

    async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError> {
        self.lock()?.role_permissions.insert((role_id, permission_id));
        Ok(())
    }

    async fn revoke_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), AppError> {
        self.lock()?.role_permissions.remove(&(role_id, permission_id));
        Ok(())
    }

    async fn assign_role(&self, identity_id: Uuid, role_id: Uuid) -> Result<bool, AppError> {
        Ok(self.lock()?.assignments.insert((identity_id, role_id)))
    }

    async fn clear_roles(&self, identity_id: Uuid) -> Result<(), AppError> {
        self.lock()?.assignments.retain(|(id, _)| *id != identity_id);
        Ok(())
    }

    async fn roles_for(&self, identity_id: Uuid, scope: Scope) -> Result<Vec<Role>, AppError> {
        let state = self.lock()?;
        let mut roles: Vec<Role> = state
            .assignments
            .iter()
            .filter(|(id, _)| *id == identity_id)
            .filter_map(|(_, role_id)| state.roles.get(role_id))
            .filter(|r| r.scope_code == scope.as_str())
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.role_name.cmp(&b.role_name));
        Ok(roles)
    }

    async fn permissions_for(
        &self,
        identity_id: Uuid,
        scope: Scope,
    ) -> Result<Vec<String>, AppError> {
        let state = self.lock()?;
        let role_ids: HashSet<Uuid> = state
            .assignments
            .iter()
            .filter(|(id, _)| *id == identity_id)
            .filter_map(|(_, role_id)| state.roles.get(role_id))
            .filter(|r| r.scope_code == scope.as_str())
            .map(|r| r.role_id)
            .collect();

        let slugs: BTreeSet<String> = state
            .role_permissions
            .iter()
            .filter(|(role_id, _)| role_ids.contains(role_id))
            .filter_map(|(_, permission_id)| state.permissions.get(permission_id))
            .filter(|p| p.scope_code == scope.as_str())
            .map(|p| p.permission_slug.clone())
            .collect();
        Ok(slugs.into_iter().collect())
    }
}

#[async_trait]
impl AdminRequestStore for MemoryStore {
    async fn find_admin_request(
        &self,
        email: &str,
    ) -> Result<Option<AdminAccessRequest>, AppError> {
        let state = self.lock()?;
        Ok(state
            .admin_requests
            .values()
            .find(|r| r.email_text == email)
            .cloned())
    }

    async fn find_admin_request_by_id(
        &self,
        request_id: Uuid,
    ) -> Result<Option<AdminAccessRequest>, AppError> {
        Ok(self.lock()?.admin_requests.get(&request_id).cloned())
    }

    async fn upsert_pending_request(
        &self,
        email: &str,
        scope: Scope,
    ) -> Result<AdminAccessRequest, AppError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .admin_requests
            .values_mut()
            .find(|r| r.email_text == email)
        {
            if !existing.is_approved() {
                existing.requested_utc = Utc::now();
            }
            return Ok(existing.clone());
        }
        let request = AdminAccessRequest::new_pending(email, scope);
        state
            .admin_requests
            .insert(request.request_id, request.clone());
        Ok(request)
    }

    async fn approve_request(
        &self,
        request_id: Uuid,
        approved_by: &str,
    ) -> Result<ApprovalOutcome, AppError> {
        let mut state = self.lock()?;
        Ok(match state.admin_requests.get_mut(&request_id) {
            None => ApprovalOutcome::NotFound,
            Some(request) if request.is_approved() => {
                ApprovalOutcome::AlreadyApproved(request.clone())
            }
            Some(request) => {
                request.status_code = AdminRequestStatus::Approved.as_str().to_string();
                request.approved_utc = Some(Utc::now());
                request.approved_by_text = Some(approved_by.to_string());
                ApprovalOutcome::Approved(request.clone())
            }
        })
    }

    async fn delete_pending_requests(&self, email: &str) -> Result<u64, AppError> {
        let mut state = self.lock()?;
        let before = state.admin_requests.len();
        state
            .admin_requests
            .retain(|_, r| r.email_text != email || r.is_approved());
        Ok((before - state.admin_requests.len()) as u64)
    }

    async fn list_admin_requests(
        &self,
        status: Option<AdminRequestStatus>,
    ) -> Result<Vec<AdminAccessRequest>, AppError> {
        let state = self.lock()?;
        let mut requests: Vec<AdminAccessRequest> = state
            .admin_requests
            .values()
            .filter(|r| status.map_or(true, |s| r.status_code == s.as_str()))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.requested_utc.cmp(&a.requested_utc));
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Target;

    #[tokio::test]
    async fn same_target_is_unique_per_scope_only() {
        let store = MemoryStore::new();
        let target = Target::parse("dup@example.com").unwrap();

        store
            .insert_identity(&Identity::new_pending(&target, Scope::Consumer))
            .await
            .unwrap();
        store
            .insert_identity(&Identity::new_pending(&target, Scope::Merchant))
            .await
            .unwrap();

        let again = store
            .insert_identity(&Identity::new_pending(&target, Scope::Consumer))
            .await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn rotation_has_a_single_winner() {
        let store = MemoryStore::new();
        let session = Session::new(
            Uuid::new_v4(),
            Scope::Consumer,
            "old-hash".to_string(),
            &SessionMeta::default(),
            Utc::now() + chrono::Duration::days(1),
        );
        store.insert_session(&session).await.unwrap();

        let expiry = Utc::now() + chrono::Duration::days(7);
        let meta = SessionMeta::default();
        let first = store
            .rotate_session("old-hash", "new-a", expiry, &meta)
            .await
            .unwrap();
        let second = store
            .rotate_session("old-hash", "new-b", expiry, &meta)
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(first.unwrap().identity_id, session.identity_id);
    }

    #[tokio::test]
    async fn approved_requests_survive_pending_cleanup() {
        let store = MemoryStore::new();
        let approved = store
            .upsert_pending_request("boss@example.com", Scope::Admin)
            .await
            .unwrap();
        store
            .approve_request(approved.request_id, "system:approval-link")
            .await
            .unwrap();
        store
            .upsert_pending_request("new@example.com", Scope::Admin)
            .await
            .unwrap();

        assert_eq!(store.delete_pending_requests("boss@example.com").await.unwrap(), 0);
        assert_eq!(store.delete_pending_requests("new@example.com").await.unwrap(), 1);
    }
}
