//! Services layer for the IAM service.
//!
//! Collaborators sit behind traits (`TenantStore`, `IdentityStore`,
//! `CacheStore`, `IdentityProvider`, `RelationEngine`) with a production
//! implementation and an in-memory double each.

mod authenticator;
pub mod cache;
mod database;
pub mod error;
mod identity_provider;
pub mod keto;
pub mod metrics;
mod provisioning;
pub mod redis;

pub use authenticator::HybridAuthenticator;
pub use cache::{CacheError, CacheStore, IdentityCache, InMemoryCacheStore, TypedCache};
pub use database::{Database, IdentityStore, MockDirectory, TenantStore};
pub use error::ServiceError;
pub use identity_provider::{
    HttpIdentityProvider, IdentityProvider, MockIdentityProvider, ProviderError,
};
pub use keto::{InMemoryRelationEngine, KetoClient, RelationEngine, RelationEngineError};
pub use provisioning::Provisioner;
pub use redis::RedisService;
