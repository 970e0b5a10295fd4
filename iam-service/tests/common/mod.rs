//! Shared setup for IAM service integration tests.
//!
//! Builds the real router over in-memory collaborators and drives it with
//! `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderName, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use iam_service::{
    build_router,
    models::{ExternalProfile, Tenant},
    services::{
        CacheError, CacheStore, HybridAuthenticator, IdentityCache, InMemoryCacheStore,
        InMemoryRelationEngine, MockDirectory, MockIdentityProvider, Provisioner,
    },
    AppState,
};
use serde_json::Value;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

pub const CACHE_PREFIX: &str = "iam:identity:";
pub const TENANT_HEADER: &str = "x-tenant-id";

pub fn profile(id: &str, email: Option<&str>, phone: Option<&str>) -> ExternalProfile {
    ExternalProfile {
        id: id.to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
    }
}

pub fn test_tenant(name: &str) -> Tenant {
    Tenant::new(
        name.to_string(),
        format!("https://{}.example.com", name),
        format!("https://admin.{}.example.com", name),
    )
}

/// Cache store whose every operation fails.
pub struct UnavailableCacheStore;

#[async_trait]
impl CacheStore for UnavailableCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub tenant: Tenant,
    pub directory: Arc<MockDirectory>,
    pub provider: Arc<MockIdentityProvider>,
    pub cache_store: Arc<InMemoryCacheStore>,
    pub identity_cache: IdentityCache,
    pub engine: Arc<InMemoryRelationEngine>,
}

impl TestApp {
    pub fn spawn(provider: MockIdentityProvider) -> Self {
        Self::spawn_with(provider, MockDirectory::new(), None)
    }

    /// `cache_override` replaces the in-memory identity cache store.
    pub fn spawn_with(
        provider: MockIdentityProvider,
        directory: MockDirectory,
        cache_override: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        Self::build(provider, directory, cache_override, false)
    }

    /// Also accepts `Authorization: Token <t>`.
    pub fn spawn_accepting_legacy_scheme(provider: MockIdentityProvider) -> Self {
        Self::build(provider, MockDirectory::new(), None, true)
    }

    fn build(
        provider: MockIdentityProvider,
        directory: MockDirectory,
        cache_override: Option<Arc<dyn CacheStore>>,
        accept_legacy_scheme: bool,
    ) -> Self {
        let tenant = test_tenant("acme");
        let directory = Arc::new(directory.with_tenant(tenant.clone()));
        let provider = Arc::new(provider);
        let cache_store = Arc::new(InMemoryCacheStore::new(1_000));
        let engine = Arc::new(InMemoryRelationEngine::new());

        let store: Arc<dyn CacheStore> = match cache_override {
            Some(store) => store,
            None => cache_store.clone(),
        };
        let identity_cache = IdentityCache::new(store, CACHE_PREFIX, Duration::from_secs(1800));

        let authenticator = HybridAuthenticator::new(
            identity_cache.clone(),
            provider.clone(),
            Provisioner::new(directory.clone()),
            accept_legacy_scheme,
        );

        let state = AppState {
            service_name: "iam-service-test".to_string(),
            service_version: "0.0.0".to_string(),
            tenant_header: HeaderName::from_static(TENANT_HEADER),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            tenants: directory.clone(),
            identity_cache: identity_cache.clone(),
            authenticator,
            relation_engine: engine.clone(),
            ip_rate_limiter: create_ip_rate_limiter(1000, 60),
        };

        Self {
            router: build_router(state),
            tenant,
            directory,
            provider,
            cache_store,
            identity_cache,
            engine,
        }
    }

    /// Request scoped to the test tenant.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        authorization: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let tenant_id = self.tenant.tenant_id.to_string();
        raw_request(method, path, Some(&tenant_id), authorization, body)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn check(&self, token: &str, body: Value) -> (StatusCode, Value) {
        let authorization = format!("Bearer {}", token);
        self.send(self.request(
            Method::POST,
            "/api/v1/permissions/check",
            Some(&authorization),
            Some(body),
        ))
        .await
    }

    pub async fn create_tuple(&self, token: &str, body: Value) -> (StatusCode, Value) {
        let authorization = format!("Bearer {}", token);
        self.send(self.request(
            Method::POST,
            "/api/v1/permissions/relation-tuples",
            Some(&authorization),
            Some(body),
        ))
        .await
    }
}

pub fn raw_request(
    method: Method,
    path: &str,
    tenant_id: Option<&str>,
    authorization: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(tenant_id) = tenant_id {
        builder = builder.header(TENANT_HEADER, tenant_id);
    }
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request"),
        None => builder.body(Body::empty()).expect("Failed to build request"),
    }
}
