//! Identity model - local user records, provisioned lazily on first login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Local identity.
///
/// Serialized as-is into the identity cache, so field changes here invalidate
/// cached entries (they fail to decode and are re-resolved).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Identity {
    pub identity_id: Uuid,
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub username: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Identity {
    /// Build a new identity from a validated external profile.
    ///
    /// The username is the phone number when present, otherwise the email.
    pub fn from_profile(profile: &ExternalProfile) -> Self {
        let now = Utc::now();
        let username = profile
            .phone()
            .or_else(|| profile.email())
            .unwrap_or(profile.id.as_str())
            .to_string();

        Self {
            identity_id: Uuid::new_v4(),
            external_id: Some(profile.id.clone()),
            email: profile.email().map(str::to_string),
            phone: profile.phone().map(str::to_string),
            username,
            created_utc: now,
            updated_utc: now,
        }
    }
}

/// Profile returned by the external identity provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ExternalProfile {
    /// Email, treating blank values as absent.
    pub fn email(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }

    /// Phone, treating blank values as absent.
    pub fn phone(&self) -> Option<&str> {
        non_blank(self.phone.as_deref())
    }

    /// A usable profile has an external id and at least one contact.
    pub fn is_complete(&self) -> bool {
        !self.id.trim().is_empty() && (self.email().is_some() || self.phone().is_some())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
