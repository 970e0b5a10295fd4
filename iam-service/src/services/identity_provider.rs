//! External identity provider client.
//!
//! The provider resolves an opaque bearer token into a profile. The caller's
//! `Authorization` header is forwarded verbatim.

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use service_core::observability::TracedRequestExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::config::IdentityProviderConfig;
use crate::models::ExternalProfile;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider rejected the token ({0})")]
    Rejected(StatusCode),

    #[error("identity provider returned an unreadable profile: {0}")]
    Decode(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_profile(&self, authorization: &str) -> Result<ExternalProfile, ProviderError>;
}

pub struct HttpIdentityProvider {
    client: Client,
    profile_url: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &IdentityProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let profile_url = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            config.profile_path
        );
        tracing::info!(url = %profile_url, "Identity provider client configured");

        Ok(Self {
            client,
            profile_url,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[tracing::instrument(skip_all, fields(url = %self.profile_url))]
    async fn get_profile(&self, authorization: &str) -> Result<ExternalProfile, ProviderError> {
        let response = self
            .client
            .get(&self.profile_url)
            .header(AUTHORIZATION, authorization)
            .with_trace_context()
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Identity provider request failed: {}", e);
                ProviderError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::info!(%status, "Identity provider rejected token");
            return Err(ProviderError::Rejected(status));
        }

        response
            .json::<ExternalProfile>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Provider stub answering from a fixed token → profile table.
#[derive(Default)]
pub struct MockIdentityProvider {
    profiles: Mutex<HashMap<String, ExternalProfile>>,
    calls: AtomicUsize,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, token: &str, profile: ExternalProfile) -> Self {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(token.to_string(), profile);
        }
        self
    }

    /// Number of `get_profile` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_profile(&self, authorization: &str) -> Result<ExternalProfile, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let token = authorization
            .split_once(' ')
            .map(|(_, token)| token.trim())
            .unwrap_or(authorization);

        self.profiles
            .lock()
            .map_err(|e| ProviderError::Decode(format!("mock provider mutex poisoned: {}", e)))?
            .get(token)
            .cloned()
            .ok_or(ProviderError::Rejected(StatusCode::UNAUTHORIZED))
    }
}
