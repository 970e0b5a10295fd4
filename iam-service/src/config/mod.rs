use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

pub const DEFAULT_TENANT_HEADER: &str = "X-Tenant-Id";
pub const DEFAULT_IDENTITY_CACHE_TTL_SECONDS: u64 = 30 * 60;
pub const DEFAULT_IDENTITY_CACHE_KEY_PREFIX: &str = "iam:identity:";
pub const DEFAULT_MEMORY_CACHE_MAX_ENTRIES: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct IamConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub auth: AuthSettings,
    pub identity_provider: IdentityProviderConfig,
    pub keto: KetoConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub identity_ttl_seconds: u64,
    pub identity_key_prefix: String,
    /// Upper bound on entries held by the in-process store.
    pub memory_max_entries: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub tenant_header: String,
    /// Also accept `Authorization: Token <t>` alongside `Bearer`.
    pub accept_legacy_token_scheme: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProviderConfig {
    pub base_url: String,
    pub profile_path: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KetoConfig {
    pub read_url: String,
    pub write_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl IamConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let cache_backend: CacheBackend = get_env("CACHE_BACKEND", Some("redis"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let redis_url = match cache_backend {
            CacheBackend::Redis => Some(get_env("REDIS_URL", None, is_prod)?),
            CacheBackend::Memory => env::var("REDIS_URL").ok(),
        };

        let config = IamConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("iam-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            cache: CacheConfig {
                backend: cache_backend,
                redis_url,
                identity_ttl_seconds: parse_env(
                    "IDENTITY_CACHE_TTL_SECONDS",
                    &DEFAULT_IDENTITY_CACHE_TTL_SECONDS.to_string(),
                )?,
                identity_key_prefix: get_env(
                    "IDENTITY_CACHE_KEY_PREFIX",
                    Some(DEFAULT_IDENTITY_CACHE_KEY_PREFIX),
                    false,
                )?,
                memory_max_entries: parse_env(
                    "MEMORY_CACHE_MAX_ENTRIES",
                    &DEFAULT_MEMORY_CACHE_MAX_ENTRIES.to_string(),
                )?,
            },
            auth: AuthSettings {
                tenant_header: get_env("TENANT_HEADER", Some(DEFAULT_TENANT_HEADER), false)?,
                accept_legacy_token_scheme: parse_env("AUTH_ACCEPT_LEGACY_TOKEN_SCHEME", "false")?,
            },
            identity_provider: IdentityProviderConfig {
                base_url: get_env("IDENTITY_PROVIDER_URL", None, is_prod)?,
                profile_path: get_env("IDENTITY_PROVIDER_PROFILE_PATH", Some("/api/v1/me"), false)?,
                timeout_ms: parse_env("IDENTITY_PROVIDER_TIMEOUT_MS", "5000")?,
            },
            keto: KetoConfig {
                read_url: get_env("KETO_READ_URL", None, is_prod)?,
                write_url: get_env("KETO_WRITE_URL", None, is_prod)?,
                timeout_ms: parse_env("KETO_TIMEOUT_MS", "5000")?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            rate_limit: RateLimitConfig {
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100")?,
                global_ip_window_seconds: parse_env("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", "60")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.cache.identity_ttl_seconds == 0 {
            return Err(config_error("IDENTITY_CACHE_TTL_SECONDS must be positive"));
        }

        if self.cache.identity_key_prefix.is_empty() {
            return Err(config_error("IDENTITY_CACHE_KEY_PREFIX must not be empty"));
        }

        if self.cache.backend == CacheBackend::Memory && self.cache.memory_max_entries == 0 {
            return Err(config_error("MEMORY_CACHE_MAX_ENTRIES must be positive"));
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            return Err(config_error("REDIS_URL is required when CACHE_BACKEND=redis"));
        }

        if axum::http::HeaderName::from_bytes(self.auth.tenant_header.as_bytes()).is_err() {
            return Err(config_error("TENANT_HEADER is not a valid header name"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(config_error(
                "DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS",
            ));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }

            if self.cache.backend == CacheBackend::Memory {
                tracing::warn!(
                    "In-process identity cache in production: entries are not shared between replicas"
                );
            }
        }

        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), false)?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            _ => Err(format!("Invalid cache backend: {}", s)),
        }
    }
}
