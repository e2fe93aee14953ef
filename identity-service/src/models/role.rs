//! Role and permission models - scoped throughout.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Scope;

/// Role entity, unique per (name, scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
pub struct Role {
    pub role_id: Uuid,
    pub role_name: String,
    pub scope_code: String,
    pub created_utc: DateTime<Utc>,
}

impl Role {
    pub fn new(name: &str, scope: Scope) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            role_name: name.to_string(),
            scope_code: scope.as_str().to_string(),
            created_utc: Utc::now(),
        }
    }
}

/// Permission entity, unique per (scope, slug).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Permission {
    pub permission_id: Uuid,
    pub scope_code: String,
    pub permission_slug: String,
    pub created_utc: DateTime<Utc>,
}

impl Permission {
    pub fn new(slug: &str, scope: Scope) -> Self {
        Self {
            permission_id: Uuid::new_v4(),
            scope_code: scope.as_str().to_string(),
            permission_slug: slug.to_string(),
            created_utc: Utc::now(),
        }
    }
}
