use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{models::Identity, AppState};

/// The authenticated identity for the current request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

/// Resolve the bearer token to a local identity and attach it to the request.
pub async fn hybrid_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // A non-UTF-8 header is malformed, not missing.
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());

    let identity = state.authenticator.authenticate(authorization).await?;

    tracing::Span::current().record("identity_id", tracing::field::display(identity.identity_id));
    req.extensions_mut().insert(AuthUser(identity));

    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("authentication required"))
    }
}
