//! Relation-tuple request shapes.
//!
//! HTTP callers send only `{namespace, relation, object}`; the subject side is
//! never taken from the body. Handlers combine the body with the resolved
//! tenant and identity into a fully scoped request, which is validated again
//! before anything reaches the relation engine.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Request body shared by create, delete and check.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RelationTupleBody {
    #[validate(length(min = 1, message = "namespace is required"))]
    #[schema(example = "document")]
    pub namespace: String,

    #[validate(length(min = 1, message = "relation is required"))]
    #[schema(example = "read")]
    pub relation: String,

    #[validate(length(min = 1, message = "object is required"))]
    #[schema(example = "doc:42")]
    pub object: String,
}

/// Subject side of every tuple: who, within which tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Validate)]
pub struct TenantRelation {
    #[validate(length(min = 1, message = "tenant id is required"))]
    pub tenant_id: String,

    /// Resolved identity id of the subject.
    #[validate(length(min = 1, message = "identifier is required"))]
    pub identifier: String,
}

impl TenantRelation {
    pub fn new(tenant_id: Uuid, identity_id: Uuid) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            identifier: identity_id.to_string(),
        }
    }

    /// Subject id as stored in the engine: `<tenant_id>/<identifier>`.
    pub fn subject_id(&self) -> String {
        format!("{}/{}", self.tenant_id, self.identifier)
    }

    /// Object id as stored in the engine: `<tenant_id>/<object>`.
    ///
    /// Prefixing objects with the tenant keeps a tuple written under one
    /// tenant from ever matching a check issued under another.
    pub fn scoped_object(&self, object: &str) -> String {
        format!("{}/{}", self.tenant_id, object)
    }
}

/// Write request: "subject has `relation` to `object` within `namespace`".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Validate)]
pub struct RelationTupleRequest {
    #[validate(length(min = 1, message = "namespace is required"))]
    pub namespace: String,

    #[validate(length(min = 1, message = "relation is required"))]
    pub relation: String,

    #[validate(length(min = 1, message = "object is required"))]
    pub object: String,

    #[validate(nested)]
    pub subject: TenantRelation,
}

/// Read-only query with the same shape and validation law as a write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Validate)]
pub struct CheckPermissionRequest {
    #[validate(length(min = 1, message = "namespace is required"))]
    pub namespace: String,

    #[validate(length(min = 1, message = "relation is required"))]
    pub relation: String,

    #[validate(length(min = 1, message = "object is required"))]
    pub object: String,

    #[validate(nested)]
    pub subject: TenantRelation,
}

/// Removes a previously written tuple.
pub type DeleteRelationTupleRequest = RelationTupleRequest;

impl RelationTupleRequest {
    pub fn new(body: RelationTupleBody, subject: TenantRelation) -> Self {
        Self {
            namespace: body.namespace,
            relation: body.relation,
            object: body.object,
            subject,
        }
    }
}

impl CheckPermissionRequest {
    pub fn new(body: RelationTupleBody, subject: TenantRelation) -> Self {
        Self {
            namespace: body.namespace,
            relation: body.relation,
            object: body.object,
            subject,
        }
    }
}

impl From<&CheckPermissionRequest> for RelationTupleRequest {
    fn from(req: &CheckPermissionRequest) -> Self {
        Self {
            namespace: req.namespace.clone(),
            relation: req.relation.clone(),
            object: req.object.clone(),
            subject: req.subject.clone(),
        }
    }
}

pub const PERMISSION_DENIED_REASON: &str = "Permission denied by policy";

/// Result of a permission check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckPermissionResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[schema(example = "Permission denied by policy")]
    pub reason: Option<String>,
}

impl CheckPermissionResponse {
    pub fn from_decision(allowed: bool) -> Self {
        Self {
            allowed,
            reason: (!allowed).then(|| PERMISSION_DENIED_REASON.to_string()),
        }
    }
}
