//! Tenant model - the isolation boundary for every authorization decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Tenant entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub name: String,
    pub public_url: String,
    pub admin_url: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Tenant {
    /// Create a new tenant.
    pub fn new(name: String, public_url: String, admin_url: String) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: Uuid::new_v4(),
            name,
            public_url,
            admin_url,
            created_utc: now,
            updated_utc: now,
        }
    }
}
