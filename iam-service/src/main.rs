use iam_service::{
    build_router,
    config::{CacheBackend, IamConfig},
    db,
    services::{
        metrics, CacheStore, Database, HttpIdentityProvider, HybridAuthenticator, IdentityCache,
        InMemoryCacheStore, KetoClient, Provisioner, RedisService,
    },
    AppState,
};
use axum::http::HeaderName;
use service_core::error::AppError;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on invalid configuration
    let config = IamConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    metrics::init_metrics().map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting IAM service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    let database = Arc::new(Database::new(pool));
    tracing::info!("Database initialized successfully");

    let cache_store: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Redis => {
            let url = config.cache.redis_url.as_deref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("REDIS_URL is required for the redis cache"))
            })?;
            let redis = RedisService::new(url)
                .await
                .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?;
            Arc::new(redis)
        }
        CacheBackend::Memory => {
            tracing::warn!("Using in-process identity cache; entries are not shared across replicas");
            Arc::new(InMemoryCacheStore::new(config.cache.memory_max_entries))
        }
    };
    let identity_cache = IdentityCache::new(
        cache_store,
        config.cache.identity_key_prefix.clone(),
        Duration::from_secs(config.cache.identity_ttl_seconds),
    );

    let identity_provider = HttpIdentityProvider::new(&config.identity_provider)
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
    let relation_engine = KetoClient::new(&config.keto)
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

    let authenticator = HybridAuthenticator::new(
        identity_cache.clone(),
        Arc::new(identity_provider),
        Provisioner::new(database.clone()),
        config.auth.accept_legacy_token_scheme,
    );

    let tenant_header = HeaderName::from_bytes(config.auth.tenant_header.as_bytes())
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );

    let state = AppState {
        service_name: config.service_name.clone(),
        service_version: config.service_version.clone(),
        tenant_header,
        allowed_origins: config.security.allowed_origins.clone(),
        tenants: database,
        identity_cache,
        authenticator,
        relation_engine: Arc::new(relation_engine),
        ip_rate_limiter,
    };
    let app = build_router(state);

    let addr: SocketAddr = config
        .common
        .bind_address()
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
