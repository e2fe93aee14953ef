//! Scope-partitioned role/permission resolution.
//!
//! Permissions are always read from the store; nothing is cached, so a
//! revocation is visible on the next call.

use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use super::store::RbacStore;
use crate::models::{Role, Scope};

pub const SUPER_ADMIN_ROLE: &str = "super_admin";
pub const STAFF_ROLE: &str = "staff";
pub const MANAGE_USERS: &str = "users:manage";

/// Roles and their permissions ensured at startup.
pub const DEFAULT_CATALOG: &[(Scope, &str, &[&str])] = &[
    (
        Scope::Consumer,
        "customer",
        &["profile:read", "profile:update", "addresses:manage", "orders:create"],
    ),
    (
        Scope::Merchant,
        "business_owner",
        &["business:manage", "branches:manage", "products:manage", "inventory:manage"],
    ),
    (
        Scope::Delivery,
        "rider",
        &["deliveries:read", "deliveries:update", "profile:update"],
    ),
    (
        Scope::Admin,
        SUPER_ADMIN_ROLE,
        &[
            MANAGE_USERS,
            "customers:read",
            "riders:read",
            "businesses:read",
            "markets:manage",
            "categories:manage",
        ],
    ),
    (
        Scope::Admin,
        STAFF_ROLE,
        &["customers:read", "riders:read", "businesses:read"],
    ),
];

#[derive(Clone)]
pub struct RbacResolver {
    store: Arc<dyn RbacStore>,
}

impl RbacResolver {
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store }
    }

    /// Inserts missing catalog roles, permissions and grants.
    pub async fn ensure_catalog(&self) -> Result<(), ServiceError> {
        for (scope, role_name, slugs) in DEFAULT_CATALOG {
            let role = self.store.upsert_role(role_name, *scope).await?;
            for slug in *slugs {
                let permission = self.store.upsert_permission(slug, *scope).await?;
                self.store
                    .grant_permission(role.role_id, permission.permission_id)
                    .await?;
            }
        }
        tracing::info!(roles = DEFAULT_CATALOG.len(), "RBAC catalog ensured");
        Ok(())
    }

    pub async fn permissions_for(
        &self,
        identity_id: Uuid,
        scope: Scope,
    ) -> Result<BTreeSet<String>, ServiceError> {
        Ok(self
            .store
            .permissions_for(identity_id, scope)
            .await?
            .into_iter()
            .collect())
    }

    pub async fn find_role(&self, name: &str, scope: Scope) -> Result<Option<Role>, ServiceError> {
        Ok(self.store.find_role(name, scope).await?)
    }

    pub async fn roles_for(&self, identity_id: Uuid, scope: Scope) -> Result<Vec<Role>, ServiceError> {
        Ok(self.store.roles_for(identity_id, scope).await?)
    }

    pub async fn role_names(
        &self,
        identity_id: Uuid,
        scope: Scope,
    ) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .roles_for(identity_id, scope)
            .await?
            .into_iter()
            .map(|r| r.role_name)
            .collect())
    }

    pub async fn has_role(
        &self,
        identity_id: Uuid,
        role_name: &str,
        scope: Scope,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .roles_for(identity_id, scope)
            .await?
            .iter()
            .any(|r| r.role_name == role_name))
    }

    /// Idempotent. The role must belong to `identity_scope`.
    pub async fn assign(
        &self,
        identity_id: Uuid,
        identity_scope: Scope,
        role_id: Uuid,
    ) -> Result<(), ServiceError> {
        let role = self
            .store
            .find_role_by_id(role_id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))?;

        if role.scope_code != identity_scope.as_str() {
            return Err(ServiceError::AccessDenied(format!(
                "role {} belongs to scope {}",
                role.role_name, role.scope_code
            )));
        }

        if self.store.assign_role(identity_id, role_id).await? {
            tracing::info!(%identity_id, role = %role.role_name, "Role assigned");
        }
        Ok(())
    }

    /// Assigns a role by name, creating the role if it does not exist yet.
    pub async fn assign_named(
        &self,
        identity_id: Uuid,
        role_name: &str,
        scope: Scope,
    ) -> Result<(), ServiceError> {
        let role = match self.store.find_role(role_name, scope).await? {
            Some(role) => role,
            None => self.store.upsert_role(role_name, scope).await?,
        };
        self.assign(identity_id, scope, role.role_id).await
    }

    pub async fn assign_default_role(
        &self,
        identity_id: Uuid,
        scope: Scope,
    ) -> Result<(), ServiceError> {
        self.assign_named(identity_id, scope.default_role(), scope).await
    }

    pub async fn clear_roles(&self, identity_id: Uuid) -> Result<(), ServiceError> {
        self.store.clear_roles(identity_id).await?;
        Ok(())
    }

    /// Removes one permission from a role. Unknown role or permission is a no-op.
    pub async fn revoke_permission(
        &self,
        scope: Scope,
        role_name: &str,
        slug: &str,
    ) -> Result<(), ServiceError> {
        let Some(role) = self.store.find_role(role_name, scope).await? else {
            return Ok(());
        };
        let Some(permission) = self.store.find_permission(slug, scope).await? else {
            return Ok(());
        };
        self.store
            .revoke_permission(role.role_id, permission.permission_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;

    async fn resolver() -> RbacResolver {
        let rbac = RbacResolver::new(Arc::new(MemoryStore::new()));
        rbac.ensure_catalog().await.unwrap();
        rbac
    }

    #[tokio::test]
    async fn test_catalog_is_idempotent() {
        let rbac = resolver().await;
        rbac.ensure_catalog().await.unwrap();

        let id = Uuid::new_v4();
        rbac.assign_default_role(id, Scope::Consumer).await.unwrap();
        let perms = rbac.permissions_for(id, Scope::Consumer).await.unwrap();
        assert_eq!(perms.len(), 4);
    }

    #[tokio::test]
    async fn test_permissions_are_scope_partitioned() {
        let rbac = resolver().await;
        let id = Uuid::new_v4();
        rbac.assign_default_role(id, Scope::Delivery).await.unwrap();

        assert!(rbac
            .permissions_for(id, Scope::Delivery)
            .await
            .unwrap()
            .contains("deliveries:read"));
        assert!(rbac.permissions_for(id, Scope::Consumer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_roles_collapse() {
        let rbac = resolver().await;
        let id = Uuid::new_v4();
        rbac.assign_named(id, SUPER_ADMIN_ROLE, Scope::Admin).await.unwrap();
        rbac.assign_named(id, STAFF_ROLE, Scope::Admin).await.unwrap();

        let perms = rbac.permissions_for(id, Scope::Admin).await.unwrap();
        assert_eq!(perms.len(), 6);
        assert!(rbac.has_role(id, SUPER_ADMIN_ROLE, Scope::Admin).await.unwrap());
    }

    #[tokio::test]
    async fn test_assign_rejects_foreign_scope_role() {
        let rbac = resolver().await;
        let id = Uuid::new_v4();
        let admin_role = rbac.store.find_role(SUPER_ADMIN_ROLE, Scope::Admin).await.unwrap().unwrap();

        let result = rbac.assign(id, Scope::Consumer, admin_role.role_id).await;
        assert!(matches!(result, Err(ServiceError::AccessDenied(_))));

        let missing = rbac.assign(id, Scope::Consumer, Uuid::new_v4()).await;
        assert!(matches!(missing, Err(ServiceError::NotFound("Role"))));
    }

    #[tokio::test]
    async fn test_revoked_permission_disappears_immediately() {
        let rbac = resolver().await;
        let id = Uuid::new_v4();
        rbac.assign_default_role(id, Scope::Consumer).await.unwrap();

        rbac.revoke_permission(Scope::Consumer, "customer", "orders:create")
            .await
            .unwrap();

        let perms = rbac.permissions_for(id, Scope::Consumer).await.unwrap();
        assert!(!perms.contains("orders:create"));
        assert!(perms.contains("profile:read"));
    }

    #[tokio::test]
    async fn test_revoking_unknown_permission_creates_nothing() {
        let rbac = resolver().await;

        rbac.revoke_permission(Scope::Consumer, "customer", "reports:export")
            .await
            .unwrap();

        let created = rbac
            .store
            .find_permission("reports:export", Scope::Consumer)
            .await
            .unwrap();
        assert!(created.is_none());
    }
}
