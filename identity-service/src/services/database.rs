//! PostgreSQL implementation of the identity stores.
//!
//! Uses sqlx runtime queries against the schema in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    AdminAccessRequest, AdminRequestStatus, Identity, IdentityStatus, OtpCode, OtpPurpose,
    Permission, Role, Scope, Session, SessionMeta,
};
use crate::services::store::{
    AdminRequestStore, ApprovalOutcome, CredentialStore, OtpStore, RbacStore, SessionStore,
};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!(e))
}

/// Unique violations become `Conflict`; everything else is a database error.
fn insert_error(e: sqlx::Error, what: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!("{} already exists", what))
        }
        _ => db_error(e),
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn find_identity(
        &self,
        target: &str,
        scope: Scope,
    ) -> Result<Option<Identity>, AppError> {
        sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE target_text = $1 AND scope_code = $2",
        )
        .bind(target)
        .bind(scope.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn find_identity_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, AppError> {
        sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE identity_id = $1")
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO identities (identity_id, target_text, scope_code, password_hash, status_code,
                                    display_name, avatar_url, email_verified, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(identity.identity_id)
        .bind(&identity.target_text)
        .bind(&identity.scope_code)
        .bind(&identity.password_hash)
        .bind(&identity.status_code)
        .bind(&identity.display_name)
        .bind(&identity.avatar_url)
        .bind(identity.email_verified)
        .bind(identity.created_utc)
        .bind(identity.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "Identity"))?;
        Ok(())
    }

    async fn activate_identity(&self, identity_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET status_code = $2, email_verified = TRUE, updated_utc = NOW()
            WHERE identity_id = $1 AND status_code = $3
            "#,
        )
        .bind(identity_id)
        .bind(IdentityStatus::Active.as_str())
        .bind(IdentityStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_password_hash(
        &self,
        identity_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE identities SET password_hash = $2, updated_utc = NOW() WHERE identity_id = $1",
        )
        .bind(identity_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_profile(
        &self,
        identity_id: Uuid,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Option<Identity>, AppError> {
        sqlx::query_as::<_, Identity>(
            r#"
            UPDATE identities
            SET display_name = COALESCE($2, display_name),
                avatar_url = COALESCE($3, avatar_url),
                updated_utc = NOW()
            WHERE identity_id = $1
            RETURNING *
            "#,
        )
        .bind(identity_id)
        .bind(display_name)
        .bind(avatar_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn set_identity_status(
        &self,
        identity_id: Uuid,
        status: IdentityStatus,
    ) -> Result<Option<Identity>, AppError> {
        sqlx::query_as::<_, Identity>(
            r#"
            UPDATE identities SET status_code = $2, updated_utc = NOW()
            WHERE identity_id = $1
            RETURNING *
            "#,
        )
        .bind(identity_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn list_identities(&self, scope: Option<Scope>) -> Result<Vec<Identity>, AppError> {
        sqlx::query_as::<_, Identity>(
            r#"
            SELECT * FROM identities
            WHERE $1::TEXT IS NULL OR scope_code = $1
            ORDER BY created_utc DESC
            "#,
        )
        .bind(scope.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn delete_identity(&self, identity_id: Uuid) -> Result<bool, AppError> {
        // sessions and role_assignments cascade
        let result = sqlx::query("DELETE FROM identities WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }
}

#[async_trait]
impl OtpStore for Database {
    async fn replace_active_code(&self, code: &OtpCode) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Serialise issuers of the same key for the rest of the transaction.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!(
                "otp:{}:{}:{}",
                code.target_text, code.purpose_code, code.scope_code
            ))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        sqlx::query(
            r#"
            UPDATE otp_codes SET consumed_utc = NOW()
            WHERE target_text = $1 AND purpose_code = $2 AND scope_code = $3 AND consumed_utc IS NULL
            "#,
        )
        .bind(&code.target_text)
        .bind(&code.purpose_code)
        .bind(&code.scope_code)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO otp_codes (otp_id, target_text, purpose_code, scope_code, code_hash,
                                   expiry_utc, attempt_count, consumed_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(code.otp_id)
        .bind(&code.target_text)
        .bind(&code.purpose_code)
        .bind(&code.scope_code)
        .bind(&code.code_hash)
        .bind(code.expiry_utc)
        .bind(code.attempt_count)
        .bind(code.consumed_utc)
        .bind(code.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| insert_error(e, "Active verification code"))?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn latest_unconsumed_code(
        &self,
        target: &str,
        purpose: OtpPurpose,
        scope: Scope,
    ) -> Result<Option<OtpCode>, AppError> {
        sqlx::query_as::<_, OtpCode>(
            r#"
            SELECT * FROM otp_codes
            WHERE target_text = $1 AND purpose_code = $2 AND scope_code = $3 AND consumed_utc IS NULL
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(target)
        .bind(purpose.as_str())
        .bind(scope.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn claim_attempt(
        &self,
        otp_id: Uuid,
        max_attempts: i32,
    ) -> Result<Option<i32>, AppError> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE otp_codes SET attempt_count = attempt_count + 1
            WHERE otp_id = $1 AND consumed_utc IS NULL AND attempt_count < $2
            RETURNING attempt_count
            "#,
        )
        .bind(otp_id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn consume_code(&self, otp_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE otp_codes SET consumed_utc = NOW() WHERE otp_id = $1 AND consumed_utc IS NULL",
        )
        .bind(otp_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }
}

const INSERT_SESSION: &str = r#"
    INSERT INTO sessions (session_id, identity_id, scope_code, refresh_token_hash, device_id,
                          ip_address, user_agent, expiry_utc, revoked_utc, created_utc)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

#[async_trait]
impl SessionStore for Database {
    async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(INSERT_SESSION)
            .bind(session.session_id)
            .bind(session.identity_id)
            .bind(&session.scope_code)
            .bind(&session.refresh_token_hash)
            .bind(&session.device_id)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .bind(session.expiry_utc)
            .bind(session.revoked_utc)
            .bind(session.created_utc)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(e, "Session"))?;
        Ok(())
    }

    async fn rotate_session(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expiry: DateTime<Utc>,
        meta: &SessionMeta,
    ) -> Result<Option<Session>, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Concurrent redeemers block on the row lock; after the winner commits
        // the predicate no longer matches and they get no row back.
        let old = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions SET revoked_utc = NOW()
            WHERE refresh_token_hash = $1 AND revoked_utc IS NULL AND expiry_utc > NOW()
            RETURNING *
            "#,
        )
        .bind(old_hash)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let Some(old) = old else {
            tx.rollback().await.map_err(db_error)?;
            return Ok(None);
        };

        let replacement = Session {
            session_id: Uuid::new_v4(),
            identity_id: old.identity_id,
            scope_code: old.scope_code,
            refresh_token_hash: new_hash.to_string(),
            device_id: meta.device_id.clone().or(old.device_id),
            ip_address: meta.ip_address.clone().or(old.ip_address),
            user_agent: meta.user_agent.clone().or(old.user_agent),
            expiry_utc: new_expiry,
            revoked_utc: None,
            created_utc: Utc::now(),
        };

        sqlx::query(INSERT_SESSION)
            .bind(replacement.session_id)
            .bind(replacement.identity_id)
            .bind(&replacement.scope_code)
            .bind(&replacement.refresh_token_hash)
            .bind(&replacement.device_id)
            .bind(&replacement.ip_address)
            .bind(&replacement.user_agent)
            .bind(replacement.expiry_utc)
            .bind(replacement.revoked_utc)
            .bind(replacement.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_error(e, "Session"))?;

        tx.commit().await.map_err(db_error)?;
        Ok(Some(replacement))
    }

    async fn revoke_session(&self, token_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE sessions SET revoked_utc = NOW() WHERE refresh_token_hash = $1 AND revoked_utc IS NULL",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn revoke_all_sessions(&self, identity_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_utc = NOW() WHERE identity_id = $1 AND revoked_utc IS NULL",
        )
        .bind(identity_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn list_active_sessions(&self, identity_id: Uuid) -> Result<Vec<Session>, AppError> {
        sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE identity_id = $1 AND revoked_utc IS NULL AND expiry_utc > NOW()
            ORDER BY created_utc DESC
            "#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }
}

#[async_trait]
impl RbacStore for Database {
    async fn find_role(&self, name: &str, scope: Scope) -> Result<Option<Role>, AppError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE role_name = $1 AND scope_code = $2")
            .bind(name)
            .bind(scope.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, AppError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE role_id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn upsert_role(&self, name: &str, scope: Scope) -> Result<Role, AppError> {
        let role = Role::new(name, scope);
        sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (role_id, role_name, scope_code, created_utc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (role_name, scope_code) DO UPDATE SET role_name = EXCLUDED.role_name
            RETURNING *
            "#,
        )
        .bind(role.role_id)
        .bind(&role.role_name)
        .bind(&role.scope_code)
        .bind(role.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn find_permission(
        &self,
        slug: &str,
        scope: Scope,
    ) -> Result<Option<Permission>, AppError> {
        sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE permission_slug = $1 AND scope_code = $2",
        )
        .bind(slug)
        .bind(scope.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn upsert_permission(&self, slug: &str, scope: Scope) -> Result<Permission, AppError> {
        let permission = Permission::new(slug, scope);
        sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (permission_id, scope_code, permission_slug, created_utc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (scope_code, permission_slug) DO UPDATE SET permission_slug = EXCLUDED.permission_slug
            RETURNING *
            "#,
        )
        .bind(permission.permission_id)
        .bind(&permission.scope_code)
        .bind(&permission.permission_slug)
        .bind(permission.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn revoke_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
            .bind(role_id)
            .bind(permission_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn assign_role(&self, identity_id: Uuid, role_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_assignments (identity_id, role_id, assigned_utc)
            VALUES ($1, $2, NOW())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(identity_id)
        .bind(role_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_roles(&self, identity_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM role_assignments WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn roles_for(&self, identity_id: Uuid, scope: Scope) -> Result<Vec<Role>, AppError> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN role_assignments ra ON ra.role_id = r.role_id
            WHERE ra.identity_id = $1 AND r.scope_code = $2
            ORDER BY r.role_name
            "#,
        )
        .bind(identity_id)
        .bind(scope.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn permissions_for(
        &self,
        identity_id: Uuid,
        scope: Scope,
    ) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.permission_slug FROM role_assignments ra
            JOIN roles r ON r.role_id = ra.role_id
            JOIN role_permissions rp ON rp.role_id = r.role_id
            JOIN permissions p ON p.permission_id = rp.permission_id
            WHERE ra.identity_id = $1 AND r.scope_code = $2 AND p.scope_code = $2
            ORDER BY p.permission_slug
            "#,
        )
        .bind(identity_id)
        .bind(scope.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }
}

#[async_trait]
impl AdminRequestStore for Database {
    async fn find_admin_request(
        &self,
        email: &str,
    ) -> Result<Option<AdminAccessRequest>, AppError> {
        sqlx::query_as::<_, AdminAccessRequest>(
            "SELECT * FROM admin_access_requests WHERE email_text = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn find_admin_request_by_id(
        &self,
        request_id: Uuid,
    ) -> Result<Option<AdminAccessRequest>, AppError> {
        sqlx::query_as::<_, AdminAccessRequest>(
            "SELECT * FROM admin_access_requests WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn upsert_pending_request(
        &self,
        email: &str,
        scope: Scope,
    ) -> Result<AdminAccessRequest, AppError> {
        let request = AdminAccessRequest::new_pending(email, scope);
        sqlx::query_as::<_, AdminAccessRequest>(
            r#"
            INSERT INTO admin_access_requests (request_id, email_text, scope_code, status_code, requested_utc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email_text) DO UPDATE SET requested_utc =
                CASE WHEN admin_access_requests.status_code = $4
                     THEN EXCLUDED.requested_utc
                     ELSE admin_access_requests.requested_utc END
            RETURNING *
            "#,
        )
        .bind(request.request_id)
        .bind(&request.email_text)
        .bind(&request.scope_code)
        .bind(&request.status_code)
        .bind(request.requested_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn approve_request(
        &self,
        request_id: Uuid,
        approved_by: &str,
    ) -> Result<ApprovalOutcome, AppError> {
        let approved = sqlx::query_as::<_, AdminAccessRequest>(
            r#"
            UPDATE admin_access_requests
            SET status_code = $2, approved_utc = NOW(), approved_by_text = $3
            WHERE request_id = $1 AND status_code = $4
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(AdminRequestStatus::Approved.as_str())
        .bind(approved_by)
        .bind(AdminRequestStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if let Some(request) = approved {
            return Ok(ApprovalOutcome::Approved(request));
        }

        Ok(match self.find_admin_request_by_id(request_id).await? {
            Some(existing) => ApprovalOutcome::AlreadyApproved(existing),
            None => ApprovalOutcome::NotFound,
        })
    }

    async fn delete_pending_requests(&self, email: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM admin_access_requests WHERE email_text = $1 AND status_code = $2",
        )
        .bind(email)
        .bind(AdminRequestStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn list_admin_requests(
        &self,
        status: Option<AdminRequestStatus>,
    ) -> Result<Vec<AdminAccessRequest>, AppError> {
        sqlx::query_as::<_, AdminAccessRequest>(
            r#"
            SELECT * FROM admin_access_requests
            WHERE ($1::TEXT IS NULL OR status_code = $1)
            ORDER BY requested_utc DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Target;

    async fn connect() -> Database {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.expect("Failed to connect");
        crate::db::run_migrations(&pool).await.expect("Failed to migrate");
        Database::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn test_partial_index_allows_one_active_code() {
        let db = connect().await;
        let target = Target::parse(&format!("otp-{}@example.com", Uuid::new_v4())).unwrap();

        for _ in 0..3 {
            let code = OtpCode::new(
                &target,
                OtpPurpose::Register,
                Scope::Consumer,
                "hash".to_string(),
                chrono::Duration::minutes(10),
            );
            db.replace_active_code(&code).await.unwrap();
        }

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM otp_codes WHERE target_text = $1 AND consumed_utc IS NULL",
        )
        .bind(target.as_str())
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn test_concurrent_rotation_single_winner() {
        let db = connect().await;
        let target = Target::parse(&format!("rot-{}@example.com", Uuid::new_v4())).unwrap();
        let identity = Identity::new_active(&target, Scope::Consumer);
        db.insert_identity(&identity).await.unwrap();

        let old_hash = Uuid::new_v4().to_string();
        let session = Session::new(
            identity.identity_id,
            Scope::Consumer,
            old_hash.clone(),
            &SessionMeta::default(),
            Utc::now() + chrono::Duration::days(1),
        );
        db.insert_session(&session).await.unwrap();

        let expiry = Utc::now() + chrono::Duration::days(7);
        let meta = SessionMeta::default();
        let (a, b) = tokio::join!(
            db.rotate_session(&old_hash, "winner-a", expiry, &meta),
            db.rotate_session(&old_hash, "winner-b", expiry, &meta),
        );
        let winners = [a.unwrap(), b.unwrap()].iter().filter(|r| r.is_some()).count();
        assert_eq!(winners, 1);
    }
}
