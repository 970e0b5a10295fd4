//! PostgreSQL-backed tenant and identity stores.
//!
//! Uses sqlx with runtime-checked queries. `MockDirectory` is the in-memory
//! stand-in used by tests and local runs without Postgres.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::error::ServiceError;
use crate::models::{Identity, Tenant};

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError>;

    /// Liveness of the backing store, reported by `/health`.
    async fn health_check(&self) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Identity>, ServiceError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Identity>, ServiceError>;
    /// Case-insensitive.
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, ServiceError>;

    /// Persist a new identity and return the stored row.
    ///
    /// If another identity with the same external id was written first, that
    /// row is returned instead of creating a duplicate.
    async fn create_identity(&self, identity: &Identity) -> Result<Identity, ServiceError>;
}

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a tenant. Tenants are provisioned outside the request path.
    pub async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, name, public_url, admin_url, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(tenant.tenant_id)
        .bind(&tenant.name)
        .bind(&tenant.public_url)
        .bind(&tenant.admin_url)
        .bind(tenant.created_utc)
        .bind(tenant.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TenantStore for Database {
    async fn get_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(e)
            })?;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for Database {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Identity>, ServiceError> {
        let identity =
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE external_id = $1")
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(identity)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Identity>, ServiceError> {
        let identity = sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE phone = $1 ORDER BY created_utc LIMIT 1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(identity)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, ServiceError> {
        let identity = sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE LOWER(email) = LOWER($1) ORDER BY created_utc LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(identity)
    }

    async fn create_identity(&self, identity: &Identity) -> Result<Identity, ServiceError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let stored = sqlx::query_as::<_, Identity>(
            r#"
            INSERT INTO identities
                (identity_id, external_id, email, phone, username, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
            RETURNING *
            "#,
        )
        .bind(identity.identity_id)
        .bind(&identity.external_id)
        .bind(&identity.email)
        .bind(&identity.phone)
        .bind(&identity.username)
        .bind(identity.created_utc)
        .bind(identity.updated_utc)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }
}

/// In-memory tenant and identity directory.
#[derive(Default)]
pub struct MockDirectory {
    tenants: Mutex<HashMap<Uuid, Tenant>>,
    identities: Mutex<Vec<Identity>>,
    creates: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(self, tenant: Tenant) -> Self {
        if let Ok(mut tenants) = self.tenants.lock() {
            tenants.insert(tenant.tenant_id, tenant);
        }
        self
    }

    pub fn with_identity(self, identity: Identity) -> Self {
        if let Ok(mut identities) = self.identities.lock() {
            identities.push(identity);
        }
        self
    }

    /// Make every subsequent `create_identity` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of identities actually inserted.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.identities
            .lock()
            .map(|identities| identities.clone())
            .unwrap_or_default()
    }

    fn find<F>(&self, predicate: F) -> Result<Option<Identity>, ServiceError>
    where
        F: Fn(&Identity) -> bool,
    {
        let identities = self
            .identities
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock directory mutex poisoned: {}", e))?;
        Ok(identities.iter().find(|i| predicate(i)).cloned())
    }
}

#[async_trait]
impl TenantStore for MockDirectory {
    async fn get_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        let tenants = self
            .tenants
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock directory mutex poisoned: {}", e))?;
        Ok(tenants.get(&tenant_id).cloned())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MockDirectory {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Identity>, ServiceError> {
        self.find(|i| i.external_id.as_deref() == Some(external_id))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Identity>, ServiceError> {
        self.find(|i| i.phone.as_deref() == Some(phone))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, ServiceError> {
        self.find(|i| {
            i.email
                .as_deref()
                .is_some_and(|stored| stored.eq_ignore_ascii_case(email))
        })
    }

    async fn create_identity(&self, identity: &Identity) -> Result<Identity, ServiceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("identity store is read-only").into());
        }

        let mut identities = self
            .identities
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock directory mutex poisoned: {}", e))?;

        if let Some(external_id) = identity.external_id.as_deref() {
            if let Some(existing) = identities
                .iter()
                .find(|i| i.external_id.as_deref() == Some(external_id))
            {
                return Ok(existing.clone());
            }
        }

        identities.push(identity.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExternalProfile;

    fn profile(id: &str, email: Option<&str>, phone: Option<&str>) -> ExternalProfile {
        ExternalProfile {
            id: id.to_string(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn mock_create_is_unique_by_external_id() {
        let directory = MockDirectory::new();
        let first = Identity::from_profile(&profile("ext-1", None, Some("+1555")));
        let second = Identity::from_profile(&profile("ext-1", None, Some("+1555")));

        let a = directory.create_identity(&first).await.unwrap();
        let b = directory.create_identity(&second).await.unwrap();

        assert_eq!(a.identity_id, b.identity_id);
        assert_eq!(directory.create_count(), 1);
    }

    #[tokio::test]
    async fn mock_email_lookup_ignores_case() {
        let existing = Identity::from_profile(&profile("ext-2", Some("Ann@Example.com"), None));
        let directory = MockDirectory::new().with_identity(existing.clone());

        let found = directory.find_by_email("ann@example.com").await.unwrap();
        assert_eq!(found, Some(existing));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a Postgres instance"]
    async fn postgres_create_returns_winning_row() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let db = Database::new(pool);

        let external_id = format!("ext-{}", Uuid::new_v4());
        let first = Identity::from_profile(&profile(&external_id, Some("a@example.com"), None));
        let second = Identity::from_profile(&profile(&external_id, Some("a@example.com"), None));

        let a = db.create_identity(&first).await.unwrap();
        let b = db.create_identity(&second).await.unwrap();

        assert_eq!(a.identity_id, first.identity_id);
        assert_eq!(b.identity_id, first.identity_id);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a Postgres instance"]
    async fn postgres_tenant_lookup_finds_inserted_tenant() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let db = Database::new(pool);

        let tenant = Tenant::new(
            "acme".to_string(),
            "https://acme.example.com".to_string(),
            "https://admin.acme.example.com".to_string(),
        );
        db.insert_tenant(&tenant).await.unwrap();

        let found = db.get_tenant_by_id(tenant.tenant_id).await.unwrap().unwrap();
        assert_eq!(found.name, "acme");
        assert!(db.get_tenant_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }
}
