use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Identity, Tenant};

/// Response for `GET /api/v1/me`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub identity: Identity,
    pub tenant: Tenant,
}
