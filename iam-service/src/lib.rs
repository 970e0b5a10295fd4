pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::services::{HybridAuthenticator, IdentityCache, RelationEngine, TenantStore};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::permission::create_relation_tuple,
        handlers::permission::delete_relation_tuple,
        handlers::permission::check_permission,
        handlers::me::get_me,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::identity::MeResponse,
            dtos::permission::RelationTupleBody,
            dtos::permission::CheckPermissionResponse,
            models::Identity,
            models::Tenant,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Permissions", description = "Tenant-scoped relation tuples and permission checks"),
        (name = "Identity", description = "The authenticated caller"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub service_version: String,
    pub tenant_header: HeaderName,
    pub allowed_origins: Vec<String>,
    pub tenants: Arc<dyn TenantStore>,
    pub identity_cache: IdentityCache,
    pub authenticator: HybridAuthenticator,
    pub relation_engine: Arc<dyn RelationEngine>,
    pub ip_rate_limiter: IpRateLimiter,
}

pub fn build_router(state: AppState) -> Router {
    // Layers run outermost-last: tenant resolution wraps authentication.
    let api_routes = Router::new()
        .route(
            "/api/v1/permissions/relation-tuples",
            post(handlers::create_relation_tuple).delete(handlers::delete_relation_tuple),
        )
        .route("/api/v1/permissions/check", post(handlers::check_permission))
        .route("/api/v1/me", get(handlers::get_me))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::hybrid_auth_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::tenant_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();
    let cors = cors_layer(&state.allowed_origins, &state.tenant_header);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(api_routes)
        .with_state(state)
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    identity_id = tracing::field::Empty,
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

fn cors_layer(allowed_origins: &[String], tenant_header: &HeaderName) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            tenant_header.clone(),
        ])
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "A dependency is unavailable")
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let database = match state.tenants.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            "down"
        }
    };

    let cache = match state.identity_cache.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "Cache health check failed");
            "down"
        }
    };

    let relation_engine = match state.relation_engine.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "Relation engine health check failed");
            "down"
        }
    };

    let healthy = [database, cache, relation_engine].iter().all(|c| *c == "up");
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "service": state.service_name,
            "version": state.service_version,
            "checks": {
                "database": database,
                "cache": cache,
                "relation_engine": relation_engine,
            }
        })),
    )
        .into_response()
}
