use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error codes carried in every error body.
pub mod codes {
    pub const INVALID_TENANT: &str = "MSG_INVALID_TENANT";
    pub const TENANT_NOT_FOUND: &str = "MSG_TENANT_NOT_FOUND";
    pub const INVALID_PAYLOAD: &str = "MSG_INVALID_PAYLOAD";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const TOO_MANY_REQUESTS: &str = "TOO_MANY_REQUESTS";
    pub const PERMISSION_CHECK_FAILED: &str = "MSG_PERMISSION_CHECK_FAILED";
    pub const RELATION_TUPLE_CREATE_FAILED: &str = "MSG_RELATION_TUPLE_CREATE_FAILED";
    pub const RELATION_TUPLE_DELETE_FAILED: &str = "MSG_RELATION_TUPLE_DELETE_FAILED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    /// Client error with an explicit code (e.g. `MSG_INVALID_TENANT`).
    #[error("Bad request: {1}")]
    BadRequest(&'static str, anyhow::Error),

    /// Request body could not be parsed; the parser's text goes to `details`.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Not found: {1}")]
    NotFound(&'static str, anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    /// A downstream dependency failed; the code names the failed operation.
    #[error("Upstream failure ({0}): {1}")]
    Upstream(&'static str, String, anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn invalid_payload(details: impl std::fmt::Display) -> Self {
        AppError::InvalidPayload(details.to_string())
    }

    pub fn unauthorized(message: impl std::fmt::Display) -> Self {
        AppError::Unauthorized(anyhow::anyhow!("{}", message))
    }

    /// The machine-readable code rendered into the error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::InvalidPayload(_) => codes::INVALID_PAYLOAD,
            AppError::BadRequest(code, _) => *code,
            AppError::NotFound(code, _) => *code,
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::TooManyRequests(_, _) => codes::TOO_MANY_REQUESTS,
            AppError::Upstream(code, _, _) => *code,
            AppError::InternalError(_) => codes::INTERNAL_ERROR,
            AppError::DatabaseError(_) => codes::DATABASE_ERROR,
            AppError::ConfigError(_) => codes::CONFIGURATION_ERROR,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::InvalidPayload(_)
            | AppError::BadRequest(_, _) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_, _) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::TooManyRequests(_, _) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_, _, _)
            | AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details, retry_after) = match self {
            AppError::ValidationError(err) => (
                "Invalid request payload".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::InvalidPayload(details) => (
                "Invalid request payload".to_string(),
                Some(details),
                None,
            ),
            AppError::BadRequest(_, err) | AppError::NotFound(_, err) => {
                (err.to_string(), None, None)
            }
            AppError::Unauthorized(err) => (err.to_string(), None, None),
            AppError::TooManyRequests(msg, retry) => (msg, None, retry),
            AppError::Upstream(_, msg, err) => {
                tracing::error!(code, error = %err, "Upstream dependency failed");
                (msg, None, None)
            }
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal server error");
                ("Internal server error".to_string(), None, None)
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                ("Database error".to_string(), None, None)
            }
            AppError::ConfigError(err) => (
                "Configuration error".to_string(),
                Some(err.to_string()),
                None,
            ),
        };

        let mut res = (
            status,
            Json(ErrorBody {
                code,
                message,
                details,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn bad_request_carries_its_code() {
        let (status, body) = body_json(AppError::BadRequest(
            codes::INVALID_TENANT,
            anyhow::anyhow!("X-Tenant-Id must be a UUID"),
        ))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MSG_INVALID_TENANT");
        assert_eq!(body["message"], "X-Tenant-Id must be a UUID");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn unparseable_payload_keeps_a_fixed_message() {
        let (status, body) =
            body_json(AppError::invalid_payload("expected value at line 1 column 1")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MSG_INVALID_PAYLOAD");
        assert_eq!(body["message"], "Invalid request payload");
        assert_eq!(body["details"], "expected value at line 1 column 1");
    }

    #[tokio::test]
    async fn upstream_failure_hides_the_cause() {
        let (status, body) = body_json(AppError::Upstream(
            codes::PERMISSION_CHECK_FAILED,
            "failed to check permission".to_string(),
            anyhow::anyhow!("connection refused"),
        ))
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "MSG_PERMISSION_CHECK_FAILED");
        assert_eq!(body["message"], "failed to check permission");
        assert!(!body.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn too_many_requests_sets_retry_after() {
        let response =
            AppError::TooManyRequests("slow down".to_string(), Some(30)).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "30"
        );
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let err = AppError::unauthorized("invalid token");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), codes::UNAUTHORIZED);
    }
}
