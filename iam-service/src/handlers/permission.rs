//! Relation-tuple permission gateway.
//!
//! Every operation runs behind the tenant and hybrid-auth middleware; the
//! subject of each tuple is always the caller, scoped to the resolved tenant.

use axum::{extract::State, Json};
use service_core::error::{codes, AppError};
use validator::Validate;

use crate::dtos::permission::{
    CheckPermissionRequest, CheckPermissionResponse, DeleteRelationTupleRequest,
    RelationTupleBody, RelationTupleRequest, TenantRelation,
};
use crate::dtos::{ErrorResponse, MessageResponse};
use crate::middleware::{AuthUser, TenantContext};
use crate::services::metrics;
use crate::utils::ValidatedJson;
use crate::AppState;

/// Grant the caller `relation` on `object` within `namespace`.
#[utoipa::path(
    post,
    path = "/api/v1/permissions/relation-tuples",
    request_body = RelationTupleBody,
    params(
        ("X-Tenant-Id" = String, Header, description = "Tenant UUID")
    ),
    responses(
        (status = 200, description = "Relation tuple created", body = MessageResponse),
        (status = 400, description = "Invalid tenant or payload", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse),
        (status = 500, description = "Relation engine failure", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip_all,
    fields(
        tenant_id = %tenant.tenant_id(),
        identity_id = %identity.identity_id,
        namespace = %body.namespace,
        relation = %body.relation,
    )
)]
pub async fn create_relation_tuple(
    State(state): State<AppState>,
    tenant: TenantContext,
    AuthUser(identity): AuthUser,
    ValidatedJson(body): ValidatedJson<RelationTupleBody>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = RelationTupleRequest::new(
        body,
        TenantRelation::new(tenant.tenant_id(), identity.identity_id),
    );
    req.validate()?;

    state
        .relation_engine
        .create_relation_tuple(&req)
        .await
        .map_err(|e| {
            AppError::Upstream(
                codes::RELATION_TUPLE_CREATE_FAILED,
                "failed to create relation tuple".to_string(),
                e.into(),
            )
        })?;

    tracing::info!("Relation tuple created");
    Ok(Json(MessageResponse::new(
        "Relation tuple created successfully",
    )))
}

/// Revoke a tuple previously granted to the caller.
#[utoipa::path(
    delete,
    path = "/api/v1/permissions/relation-tuples",
    request_body = RelationTupleBody,
    params(
        ("X-Tenant-Id" = String, Header, description = "Tenant UUID")
    ),
    responses(
        (status = 200, description = "Relation tuple deleted", body = MessageResponse),
        (status = 400, description = "Invalid tenant or payload", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse),
        (status = 500, description = "Relation engine failure", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip_all,
    fields(
        tenant_id = %tenant.tenant_id(),
        identity_id = %identity.identity_id,
        namespace = %body.namespace,
        relation = %body.relation,
    )
)]
pub async fn delete_relation_tuple(
    State(state): State<AppState>,
    tenant: TenantContext,
    AuthUser(identity): AuthUser,
    ValidatedJson(body): ValidatedJson<RelationTupleBody>,
) -> Result<Json<MessageResponse>, AppError> {
    let req: DeleteRelationTupleRequest = RelationTupleRequest::new(
        body,
        TenantRelation::new(tenant.tenant_id(), identity.identity_id),
    );
    req.validate()?;

    state
        .relation_engine
        .delete_relation_tuple(&req)
        .await
        .map_err(|e| {
            AppError::Upstream(
                codes::RELATION_TUPLE_DELETE_FAILED,
                "failed to delete relation tuple".to_string(),
                e.into(),
            )
        })?;

    tracing::info!("Relation tuple deleted");
    Ok(Json(MessageResponse::new(
        "Relation tuple deleted successfully",
    )))
}

/// Ask whether the caller holds `relation` on `object`.
///
/// A denial is a successful answer, not an error.
#[utoipa::path(
    post,
    path = "/api/v1/permissions/check",
    request_body = RelationTupleBody,
    params(
        ("X-Tenant-Id" = String, Header, description = "Tenant UUID")
    ),
    responses(
        (status = 200, description = "Decision", body = CheckPermissionResponse),
        (status = 400, description = "Invalid tenant or payload", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse),
        (status = 500, description = "Relation engine failure", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip_all,
    fields(
        tenant_id = %tenant.tenant_id(),
        identity_id = %identity.identity_id,
        namespace = %body.namespace,
        relation = %body.relation,
    )
)]
pub async fn check_permission(
    State(state): State<AppState>,
    tenant: TenantContext,
    AuthUser(identity): AuthUser,
    ValidatedJson(body): ValidatedJson<RelationTupleBody>,
) -> Result<Json<CheckPermissionResponse>, AppError> {
    let req = CheckPermissionRequest::new(
        body,
        TenantRelation::new(tenant.tenant_id(), identity.identity_id),
    );
    req.validate()?;

    let allowed = state
        .relation_engine
        .check_permission(&req)
        .await
        .map_err(|e| {
            AppError::Upstream(
                codes::PERMISSION_CHECK_FAILED,
                "failed to check permission".to_string(),
                e.into(),
            )
        })?;

    metrics::record_permission_check(allowed);
    tracing::debug!(allowed, "Permission checked");
    Ok(Json(CheckPermissionResponse::from_decision(allowed)))
}
