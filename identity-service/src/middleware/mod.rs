pub mod auth;
pub mod extract;

pub use auth::{auth_middleware, require_permission, AuthUser};
pub use extract::{AppScope, ClientMeta};
