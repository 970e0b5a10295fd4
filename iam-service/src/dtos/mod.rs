pub mod identity;
pub mod permission;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "MSG_INVALID_PAYLOAD")]
    pub code: String,
    #[schema(example = "Invalid request payload")]
    pub message: String,
    pub details: Option<String>,
}

/// Plain confirmation body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Relation tuple created successfully")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
