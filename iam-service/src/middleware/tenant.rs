//! Tenant resolution.
//!
//! Reads the tenant header, parses it as a UUID and loads the tenant. Runs
//! before authentication so a bad tenant never costs a provider round-trip.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::{codes, AppError};
use uuid::Uuid;

use crate::{models::Tenant, AppState};

/// The tenant resolved for the current request.
#[derive(Debug, Clone)]
pub struct TenantContext(pub Tenant);

impl TenantContext {
    pub fn tenant_id(&self) -> Uuid {
        self.0.tenant_id
    }
}

pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = &state.tenant_header;
    let raw = request
        .headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest(
                codes::INVALID_TENANT,
                anyhow::anyhow!("{} header is required", header),
            )
        })?;

    let tenant_id = Uuid::parse_str(raw).map_err(|_| {
        AppError::BadRequest(
            codes::INVALID_TENANT,
            anyhow::anyhow!("{} must be a valid UUID", header),
        )
    })?;

    let tenant = state
        .tenants
        .get_tenant_by_id(tenant_id)
        .await?
        .ok_or_else(|| {
            tracing::info!(%tenant_id, "Unknown tenant");
            AppError::NotFound(codes::TENANT_NOT_FOUND, anyhow::anyhow!("tenant not found"))
        })?;

    request.extensions_mut().insert(TenantContext(tenant));
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or_else(|| {
                AppError::BadRequest(
                    codes::INVALID_TENANT,
                    anyhow::anyhow!("tenant context not found"),
                )
            })
    }
}
