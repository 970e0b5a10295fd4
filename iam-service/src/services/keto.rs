//! Relation-engine client.
//!
//! Talks to a Keto-compatible engine over its REST API: tuple writes and
//! deletes go to the admin (write) endpoint, checks to the read endpoint.
//! Every tuple is tenant-scoped via `TenantRelation` before it leaves the
//! process.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use service_core::observability::TracedRequestExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::config::KetoConfig;
use crate::dtos::permission::{CheckPermissionRequest, RelationTupleRequest};

#[derive(Debug, Error)]
pub enum RelationEngineError {
    #[error("relation engine request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("relation engine returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("relation engine unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RelationEngine: Send + Sync {
    async fn create_relation_tuple(&self, req: &RelationTupleRequest)
        -> Result<(), RelationEngineError>;
    async fn delete_relation_tuple(&self, req: &RelationTupleRequest)
        -> Result<(), RelationEngineError>;
    async fn check_permission(&self, req: &CheckPermissionRequest)
        -> Result<bool, RelationEngineError>;
    async fn health_check(&self) -> Result<(), RelationEngineError>;
}

/// Tuple as sent on the wire, already tenant-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct KetoTuple {
    pub namespace: String,
    pub object: String,
    pub relation: String,
    pub subject_id: String,
}

impl From<&RelationTupleRequest> for KetoTuple {
    fn from(req: &RelationTupleRequest) -> Self {
        Self {
            namespace: req.namespace.clone(),
            object: req.subject.scoped_object(&req.object),
            relation: req.relation.clone(),
            subject_id: req.subject.subject_id(),
        }
    }
}

impl From<&CheckPermissionRequest> for KetoTuple {
    fn from(req: &CheckPermissionRequest) -> Self {
        KetoTuple::from(&RelationTupleRequest::from(req))
    }
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    allowed: bool,
}

pub struct KetoClient {
    client: Client,
    read_url: String,
    write_url: String,
}

impl KetoClient {
    pub fn new(config: &KetoConfig) -> Result<Self, RelationEngineError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        tracing::info!(
            read_url = %config.read_url,
            write_url = %config.write_url,
            "Relation engine client configured"
        );

        Ok(Self {
            client,
            read_url: config.read_url.trim_end_matches('/').to_string(),
            write_url: config.write_url.trim_end_matches('/').to_string(),
        })
    }

    async fn ensure_success(response: reqwest::Response) -> Result<(), RelationEngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RelationEngineError::Status { status, body })
    }
}

#[async_trait]
impl RelationEngine for KetoClient {
    #[tracing::instrument(skip_all, fields(namespace = %req.namespace, relation = %req.relation))]
    async fn create_relation_tuple(
        &self,
        req: &RelationTupleRequest,
    ) -> Result<(), RelationEngineError> {
        let tuple = KetoTuple::from(req);
        let response = self
            .client
            .put(format!("{}/admin/relation-tuples", self.write_url))
            .json(&tuple)
            .with_trace_context()
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    #[tracing::instrument(skip_all, fields(namespace = %req.namespace, relation = %req.relation))]
    async fn delete_relation_tuple(
        &self,
        req: &RelationTupleRequest,
    ) -> Result<(), RelationEngineError> {
        let tuple = KetoTuple::from(req);
        let response = self
            .client
            .delete(format!("{}/admin/relation-tuples", self.write_url))
            .query(&tuple)
            .with_trace_context()
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    #[tracing::instrument(skip_all, fields(namespace = %req.namespace, relation = %req.relation))]
    async fn check_permission(
        &self,
        req: &CheckPermissionRequest,
    ) -> Result<bool, RelationEngineError> {
        let tuple = KetoTuple::from(req);
        let response = self
            .client
            .post(format!("{}/relation-tuples/check/openapi", self.read_url))
            .json(&tuple)
            .with_trace_context()
            .send()
            .await?;

        // Keto answers a denied check with 403 and the same body shape.
        let status = response.status();
        if !status.is_success() && status != StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(RelationEngineError::Status { status, body });
        }

        let decision: CheckResponse = response.json().await?;
        Ok(decision.allowed)
    }

    async fn health_check(&self) -> Result<(), RelationEngineError> {
        let response = self
            .client
            .get(format!("{}/health/ready", self.read_url))
            .send()
            .await?;
        Self::ensure_success(response).await
    }
}

/// Relation engine with set semantics over exact tuples.
#[derive(Default)]
pub struct InMemoryRelationEngine {
    tuples: Mutex<HashSet<KetoTuple>>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryRelationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Total calls across all operations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn tuples(&self) -> Vec<KetoTuple> {
        self.tuples
            .lock()
            .map(|tuples| tuples.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn begin(&self) -> Result<std::sync::MutexGuard<'_, HashSet<KetoTuple>>, RelationEngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RelationEngineError::Unavailable(
                "engine switched off".to_string(),
            ));
        }
        self.tuples
            .lock()
            .map_err(|e| RelationEngineError::Unavailable(format!("mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl RelationEngine for InMemoryRelationEngine {
    async fn create_relation_tuple(
        &self,
        req: &RelationTupleRequest,
    ) -> Result<(), RelationEngineError> {
        self.begin()?.insert(KetoTuple::from(req));
        Ok(())
    }

    async fn delete_relation_tuple(
        &self,
        req: &RelationTupleRequest,
    ) -> Result<(), RelationEngineError> {
        self.begin()?.remove(&KetoTuple::from(req));
        Ok(())
    }

    async fn check_permission(
        &self,
        req: &CheckPermissionRequest,
    ) -> Result<bool, RelationEngineError> {
        Ok(self.begin()?.contains(&KetoTuple::from(req)))
    }

    async fn health_check(&self) -> Result<(), RelationEngineError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RelationEngineError::Unavailable(
                "engine switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::permission::TenantRelation;

    fn tuple(tenant: &str, object: &str) -> RelationTupleRequest {
        RelationTupleRequest {
            namespace: "document".to_string(),
            relation: "read".to_string(),
            object: object.to_string(),
            subject: TenantRelation {
                tenant_id: tenant.to_string(),
                identifier: "user-1".to_string(),
            },
        }
    }

    fn check_for(req: &RelationTupleRequest) -> CheckPermissionRequest {
        CheckPermissionRequest {
            namespace: req.namespace.clone(),
            relation: req.relation.clone(),
            object: req.object.clone(),
            subject: req.subject.clone(),
        }
    }

    #[test]
    fn wire_tuple_is_tenant_scoped() {
        let wire = KetoTuple::from(&tuple("t1", "doc:42"));
        assert_eq!(wire.object, "t1/doc:42");
        assert_eq!(wire.subject_id, "t1/user-1");
        assert_eq!(wire.namespace, "document");
    }

    #[tokio::test]
    async fn duplicate_writes_are_idempotent() {
        let engine = InMemoryRelationEngine::new();
        let req = tuple("t1", "doc:42");

        engine.create_relation_tuple(&req).await.unwrap();
        assert!(engine.check_permission(&check_for(&req)).await.unwrap());

        engine.create_relation_tuple(&req).await.unwrap();
        assert!(engine.check_permission(&check_for(&req)).await.unwrap());
        assert_eq!(engine.tuples().len(), 1);
    }

    #[tokio::test]
    async fn tuples_do_not_leak_across_tenants() {
        let engine = InMemoryRelationEngine::new();
        engine
            .create_relation_tuple(&tuple("t1", "doc:42"))
            .await
            .unwrap();

        let other_tenant = check_for(&tuple("t2", "doc:42"));
        assert!(!engine.check_permission(&other_tenant).await.unwrap());
    }

    #[tokio::test]
    async fn delete_revokes() {
        let engine = InMemoryRelationEngine::new();
        let req = tuple("t1", "doc:42");

        engine.create_relation_tuple(&req).await.unwrap();
        engine.delete_relation_tuple(&req).await.unwrap();

        assert!(!engine.check_permission(&check_for(&req)).await.unwrap());
    }
}
