//! Hybrid bearer-token authentication.
//!
//! A token is resolved from the identity cache when possible. On a miss it is
//! re-validated against the external provider, mapped onto a local identity
//! and cached for the configured TTL.

use service_core::error::AppError;
use std::sync::Arc;
use tracing::Instrument;

use super::cache::IdentityCache;
use super::identity_provider::IdentityProvider;
use super::metrics;
use super::provisioning::Provisioner;
use crate::models::Identity;
use crate::utils::{extract_token, hash_token};

#[derive(Clone)]
pub struct HybridAuthenticator {
    cache: IdentityCache,
    provider: Arc<dyn IdentityProvider>,
    provisioner: Provisioner,
    accept_legacy_scheme: bool,
}

impl HybridAuthenticator {
    pub fn new(
        cache: IdentityCache,
        provider: Arc<dyn IdentityProvider>,
        provisioner: Provisioner,
        accept_legacy_scheme: bool,
    ) -> Self {
        Self {
            cache,
            provider,
            provisioner,
            accept_legacy_scheme,
        }
    }

    /// Resolve the `Authorization` header value to a local identity.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, AppError> {
        let token = extract_token(authorization, self.accept_legacy_scheme).map_err(|e| {
            metrics::record_authentication_failure("header");
            AppError::unauthorized(e)
        })?;
        let token_hash = hash_token(token);
        let span = tracing::info_span!("authenticate", token = %&token_hash[..12]);

        // extract_token succeeded, so the header is present.
        self.resolve(authorization.unwrap_or_default(), &token_hash)
            .instrument(span)
            .await
    }

    async fn resolve(&self, authorization: &str, token_hash: &str) -> Result<Identity, AppError> {
        match self.cache.get(token_hash).await {
            Ok(Some(identity)) => {
                metrics::record_identity_cache(true);
                tracing::debug!(identity_id = %identity.identity_id, "Identity cache hit");
                return Ok(identity);
            }
            Ok(None) => metrics::record_identity_cache(false),
            Err(e) => {
                metrics::record_identity_cache(false);
                tracing::warn!(error = %e, "Identity cache read failed, resolving upstream");
            }
        }

        let profile = self.provider.get_profile(authorization).await.map_err(|e| {
            metrics::record_authentication_failure("provider");
            tracing::info!(error = %e, "Identity provider did not accept token");
            AppError::unauthorized("invalid token")
        })?;

        if !profile.is_complete() {
            metrics::record_authentication_failure("profile");
            tracing::warn!(external_id = %profile.id, "Identity provider returned incomplete profile");
            return Err(AppError::unauthorized("invalid token data"));
        }

        let identity = self.provisioner.resolve(&profile).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to provision identity");
            AppError::from(e)
        })?;

        if let Err(e) = self.cache.set(token_hash, &identity).await {
            tracing::warn!(error = %e, "Failed to cache resolved identity");
        }

        Ok(identity)
    }
}
