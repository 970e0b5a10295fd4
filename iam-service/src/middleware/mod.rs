pub mod auth;
pub mod tenant;

pub use auth::{hybrid_auth_middleware, AuthUser};
pub use tenant::{tenant_middleware, TenantContext};
