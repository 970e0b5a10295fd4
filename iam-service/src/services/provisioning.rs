use std::sync::Arc;

use super::database::IdentityStore;
use super::error::ServiceError;
use super::metrics;
use crate::models::{ExternalProfile, Identity};

/// Maps an externally authenticated profile onto a local identity, creating
/// one on first sight.
#[derive(Clone)]
pub struct Provisioner {
    store: Arc<dyn IdentityStore>,
}

impl Provisioner {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Lookup order: external id, then phone, then email. Only when all three
    /// miss is a new identity persisted.
    #[tracing::instrument(skip_all, fields(external_id = %profile.id))]
    pub async fn resolve(&self, profile: &ExternalProfile) -> Result<Identity, ServiceError> {
        if let Some(identity) = self.store.find_by_external_id(&profile.id).await? {
            return Ok(identity);
        }

        if let Some(phone) = profile.phone() {
            if let Some(identity) = self.store.find_by_phone(phone).await? {
                tracing::debug!(identity_id = %identity.identity_id, "Matched identity by phone");
                return Ok(identity);
            }
        }

        if let Some(email) = profile.email() {
            if let Some(identity) = self.store.find_by_email(email).await? {
                tracing::debug!(identity_id = %identity.identity_id, "Matched identity by email");
                return Ok(identity);
            }
        }

        let identity = self.store.create_identity(&Identity::from_profile(profile)).await?;
        metrics::record_identity_provisioned();
        tracing::info!(identity_id = %identity.identity_id, "Provisioned new identity");
        Ok(identity)
    }
}
