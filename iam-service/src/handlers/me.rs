use axum::Json;

use crate::dtos::{identity::MeResponse, ErrorResponse};
use crate::middleware::{AuthUser, TenantContext};

/// The authenticated identity and the tenant it is acting in.
#[utoipa::path(
    get,
    path = "/api/v1/me",
    params(
        ("X-Tenant-Id" = String, Header, description = "Tenant UUID")
    ),
    responses(
        (status = 200, description = "Current identity", body = MeResponse),
        (status = 400, description = "Invalid tenant", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse)
    ),
    tag = "Identity",
    security(("bearer_auth" = []))
)]
pub async fn get_me(tenant: TenantContext, AuthUser(identity): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        identity,
        tenant: tenant.0,
    })
}
