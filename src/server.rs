//! HTTP server bootstrap for the rocket resequencer.
//!
//! This module wires together:
//! - configuration
//! - storage backend and channel serializer
//! - the resequencer and query services
//! - the Axum router and graceful shutdown

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use sqlx::postgres::PgPool;
use sqlx::sqlite::SqlitePool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::domain::ValidationMode;
use crate::infra::{
    postgres, serve_with_shutdown, shutdown_signal, sqlite, ChannelSerializer,
    GracefulShutdownConfig, InMemoryMessageLog, InMemoryRocketStore, LocalChannelLocks,
    MessageLog, PgAdvisoryChannelLocks, PgMessageLog, PgRocketStore, RequestTracker,
    ResequencerError, RocketStore, SqliteMessageLog, SqliteRocketStore,
    StripedChannelLocks, DEFAULT_LOCK_STRIPES, DEFAULT_PRUNE_THRESHOLD,
};
use crate::metrics::MetricsRegistry;
use crate::query::RocketQueryService;
use crate::resequencer::Resequencer;
use crate::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

// ============================================================================
// Configuration
// ============================================================================

/// Where messages and projections are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Postgres => "postgres",
            StorageBackend::Sqlite => "sqlite",
        }
    }

    fn default_database_url(&self) -> Option<&'static str> {
        match self {
            StorageBackend::Memory => None,
            StorageBackend::Postgres => Some("postgres://localhost/rocket_resequencer"),
            StorageBackend::Sqlite => Some("sqlite://rocket-resequencer.db"),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StorageBackend::Postgres),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(format!(
                "Invalid storage backend: '{}'. Expected: memory, postgres or sqlite",
                other
            )),
        }
    }
}

/// How per-channel reconciliation is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelLockMode {
    /// One lazily created mutex per channel in this process
    #[default]
    Local,
    /// A fixed pool of mutexes selected by channel hash
    Striped,
    /// Postgres advisory locks, for several instances sharing one database
    Postgres,
}

impl FromStr for ChannelLockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ChannelLockMode::Local),
            "striped" => Ok(ChannelLockMode::Striped),
            "postgres" | "advisory" => Ok(ChannelLockMode::Postgres),
            other => Err(format!(
                "Invalid channel lock mode: '{}'. Expected: local, striped or postgres",
                other
            )),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server listen address.
    pub listen_addr: SocketAddr,
    pub storage_backend: StorageBackend,
    /// Connection URL; `None` for the in-memory backend.
    pub database_url: Option<String>,
    /// Maximum database connections.
    pub max_connections: u32,
    pub migrate_on_startup: bool,
    pub validation_mode: ValidationMode,
    pub lock_mode: ChannelLockMode,
    pub lock_stripes: usize,
    pub lock_prune_threshold: usize,
    pub shutdown: GracefulShutdownConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ResequencerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ResequencerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&lookup, "PORT", 8088)?;
        let listen_addr: SocketAddr = format!("{host}:{port}").parse().map_err(|e| {
            ResequencerError::Configuration(format!("Invalid listen address {host}:{port}: {e}"))
        })?;

        let storage_backend: StorageBackend =
            parse_or(&lookup, "STORAGE_BACKEND", StorageBackend::Memory)?;
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .or_else(|| storage_backend.default_database_url().map(str::to_string));
        let database_url = match storage_backend {
            StorageBackend::Memory => None,
            _ => database_url,
        };

        let max_connections: u32 = parse_or(&lookup, "MAX_DB_CONNECTIONS", 10)?;
        let migrate_on_startup = lookup("DB_MIGRATE_ON_STARTUP")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "off" | "no"))
            .unwrap_or(true);

        let validation_mode = match lookup("VALIDATION_MODE") {
            Some(value) => {
                ValidationMode::from_env_value(&value).map_err(ResequencerError::Configuration)?
            }
            None => ValidationMode::default(),
        };

        let lock_mode: ChannelLockMode =
            parse_or(&lookup, "CHANNEL_LOCK_MODE", ChannelLockMode::Local)?;
        if lock_mode == ChannelLockMode::Postgres && storage_backend != StorageBackend::Postgres {
            return Err(ResequencerError::Configuration(format!(
                "CHANNEL_LOCK_MODE=postgres requires STORAGE_BACKEND=postgres (got {})",
                storage_backend
            )));
        }
        let lock_stripes: usize = parse_or(&lookup, "CHANNEL_LOCK_STRIPES", DEFAULT_LOCK_STRIPES)?;
        let lock_prune_threshold: usize =
            parse_or(&lookup, "CHANNEL_LOCK_PRUNE_THRESHOLD", DEFAULT_PRUNE_THRESHOLD)?;

        let drain_secs: u64 = parse_or(&lookup, "SHUTDOWN_DRAIN_TIMEOUT_SECS", 30)?;
        let delay_secs: u64 = parse_or(&lookup, "SHUTDOWN_DELAY_SECS", 0)?;

        Ok(Self {
            listen_addr,
            storage_backend,
            database_url,
            max_connections,
            migrate_on_startup,
            validation_mode,
            lock_mode,
            lock_stripes,
            lock_prune_threshold,
            shutdown: GracefulShutdownConfig {
                drain_timeout: Duration::from_secs(drain_secs),
                shutdown_delay: Duration::from_secs(delay_secs),
            },
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ResequencerError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ResequencerError::Configuration(format!("Invalid {key} {raw:?}: {e}"))),
        None => Ok(default),
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub resequencer: Arc<Resequencer>,
    pub query: RocketQueryService,
    pub metrics: Arc<MetricsRegistry>,
    pub request_tracker: Arc<RequestTracker>,
    /// Backend name reported by `/ready`
    pub storage_backend: &'static str,
}

impl AppState {
    /// State over an existing resequencer. `rockets` must be the store the
    /// resequencer writes to.
    pub fn new(
        resequencer: Arc<Resequencer>,
        rockets: Arc<dyn RocketStore>,
        storage_backend: StorageBackend,
    ) -> Self {
        Self {
            metrics: resequencer.metrics().clone(),
            resequencer,
            query: RocketQueryService::new(rockets),
            request_tracker: Arc::new(RequestTracker::new()),
            storage_backend: storage_backend.as_str(),
        }
    }

    /// Fresh in-memory stores with default settings
    pub fn in_memory() -> Self {
        let log: Arc<dyn MessageLog> = Arc::new(InMemoryMessageLog::new());
        let rockets: Arc<dyn RocketStore> = Arc::new(InMemoryRocketStore::new());
        let resequencer = Arc::new(Resequencer::new(log, rockets.clone()));
        Self::new(resequencer, rockets, StorageBackend::Memory)
    }

    pub fn with_request_tracker(mut self, tracker: Arc<RequestTracker>) -> Self {
        self.request_tracker = tracker;
        self
    }
}

// ============================================================================
// Storage Wiring
// ============================================================================

enum PoolHandle {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Opened stores plus the pools to close on shutdown.
struct Storage {
    log: Arc<dyn MessageLog>,
    rockets: Arc<dyn RocketStore>,
    serializer: Arc<dyn ChannelSerializer>,
    pools: Vec<PoolHandle>,
}

impl Storage {
    async fn close(self) {
        for pool in self.pools {
            match pool {
                PoolHandle::Postgres(pool) => pool.close().await,
                PoolHandle::Sqlite(pool) => pool.close().await,
            }
        }
    }
}

async fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let database_url = || {
        config.database_url.clone().ok_or_else(|| {
            ResequencerError::Configuration("DATABASE_URL is required".to_string())
        })
    };

    let (log, rockets, mut pools): (Arc<dyn MessageLog>, Arc<dyn RocketStore>, Vec<PoolHandle>) =
        match config.storage_backend {
            StorageBackend::Memory => {
                warn!("Using in-memory storage; messages and projections are lost on restart");
                (
                    Arc::new(InMemoryMessageLog::new()),
                    Arc::new(InMemoryRocketStore::new()),
                    Vec::new(),
                )
            }
            StorageBackend::Postgres => {
                let url = database_url()?;
                info!("Connecting to PostgreSQL...");
                let pool = postgres::connect(&url, config.max_connections).await?;
                if config.migrate_on_startup {
                    info!("Running database migrations...");
                    crate::migrations::run_postgres(&pool).await?;
                } else {
                    info!("Skipping database migrations (DB_MIGRATE_ON_STARTUP=false)");
                }
                (
                    Arc::new(PgMessageLog::new(pool.clone())),
                    Arc::new(PgRocketStore::new(pool.clone())),
                    vec![PoolHandle::Postgres(pool)],
                )
            }
            StorageBackend::Sqlite => {
                let url = database_url()?;
                info!("Opening SQLite database...");
                let pool = sqlite::connect(&url, config.max_connections).await?;
                if config.migrate_on_startup {
                    info!("Running database migrations...");
                    crate::migrations::run_sqlite(&pool).await?;
                } else {
                    info!("Skipping database migrations (DB_MIGRATE_ON_STARTUP=false)");
                }
                (
                    Arc::new(SqliteMessageLog::new(pool.clone())),
                    Arc::new(SqliteRocketStore::new(pool.clone())),
                    vec![PoolHandle::Sqlite(pool)],
                )
            }
        };

    let serializer: Arc<dyn ChannelSerializer> = match config.lock_mode {
        ChannelLockMode::Local => Arc::new(LocalChannelLocks::with_prune_threshold(
            config.lock_prune_threshold,
        )),
        ChannelLockMode::Striped => Arc::new(StripedChannelLocks::new(config.lock_stripes)),
        ChannelLockMode::Postgres => {
            // Each held advisory lock pins a connection, so locks get their own
            // pool and cannot starve the store queries made while holding one.
            // Waiters on one channel queue in-process first and hold no connection.
            let url = database_url()?;
            let lock_pool = postgres::connect(&url, config.max_connections).await?;
            pools.push(PoolHandle::Postgres(lock_pool.clone()));
            Arc::new(PgAdvisoryChannelLocks::new(lock_pool))
        }
    };

    Ok(Storage {
        log,
        rockets,
        serializer,
        pools,
    })
}

// ============================================================================
// Server
// ============================================================================

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {e}"))?;

    info!("Starting rocket resequencer v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        storage = %config.storage_backend,
        validation = %config.validation_mode,
        lock_mode = ?config.lock_mode,
        "Loaded configuration"
    );

    let storage = open_storage(&config).await?;

    let resequencer = Arc::new(
        Resequencer::new(storage.log.clone(), storage.rockets.clone())
            .with_serializer(storage.serializer.clone())
            .with_validation_mode(config.validation_mode)
            .with_metrics(Arc::new(MetricsRegistry::new())),
    );
    info!(serializer = resequencer.serializer_name(), "Resequencer ready");

    let tracker = Arc::new(RequestTracker::new());
    let state = AppState::new(resequencer, storage.rockets.clone(), config.storage_backend)
        .with_request_tracker(tracker.clone());

    let app = build_router(state)?;

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    serve_with_shutdown(
        listener,
        app,
        tracker,
        config.shutdown.clone(),
        shutdown_signal(),
    )
    .await?;

    storage.close().await;
    info!("Rocket resequencer stopped");
    shutdown_telemetry();

    Ok(())
}

/// Build the full application router.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let api = crate::api::router().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        track_requests,
    ));

    let mut router = Router::new()
        .merge(api)
        .merge(crate::api::ops_router())
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }

    Ok(router.with_state(state))
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let _guard = state.request_tracker.request_start();
    next.run(request).await
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ResequencerError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.listen_addr.port(), 8088);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 10);
        assert!(config.migrate_on_startup);
        assert_eq!(config.validation_mode, ValidationMode::Lenient);
        assert_eq!(config.lock_mode, ChannelLockMode::Local);
        assert_eq!(config.lock_stripes, DEFAULT_LOCK_STRIPES);
        assert_eq!(config.shutdown.drain_timeout, Duration::from_secs(30));
        assert!(config.shutdown.shutdown_delay.is_zero());
    }

    #[test]
    fn test_postgres_backend_gets_default_url() {
        let config = config_from(&[("STORAGE_BACKEND", "postgres")]).unwrap();
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/rocket_resequencer")
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("STORAGE_BACKEND", "sqlite"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("DB_MIGRATE_ON_STARTUP", "off"),
            ("VALIDATION_MODE", "strict"),
            ("CHANNEL_LOCK_MODE", "striped"),
            ("CHANNEL_LOCK_STRIPES", "64"),
            ("SHUTDOWN_DRAIN_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.storage_backend, StorageBackend::Sqlite);
        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
        assert!(!config.migrate_on_startup);
        assert!(config.validation_mode.is_strict());
        assert_eq!(config.lock_mode, ChannelLockMode::Striped);
        assert_eq!(config.lock_stripes, 64);
        assert_eq!(config.shutdown.drain_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        for pairs in [
            &[("PORT", "not-a-port")][..],
            &[("STORAGE_BACKEND", "redis")][..],
            &[("VALIDATION_MODE", "paranoid")][..],
            &[("CHANNEL_LOCK_MODE", "global")][..],
        ] {
            let err = config_from(pairs).unwrap_err();
            assert!(matches!(err, ResequencerError::Configuration(_)), "{pairs:?}");
        }
    }

    #[test]
    fn test_advisory_locks_require_postgres() {
        let err = config_from(&[("CHANNEL_LOCK_MODE", "postgres")]).unwrap_err();
        assert!(matches!(err, ResequencerError::Configuration(_)));

        let config = config_from(&[
            ("STORAGE_BACKEND", "postgres"),
            ("CHANNEL_LOCK_MODE", "postgres"),
        ])
        .unwrap();
        assert_eq!(config.lock_mode, ChannelLockMode::Postgres);
    }

    #[tokio::test]
    async fn test_memory_storage_opens() {
        let config = config_from(&[("CHANNEL_LOCK_MODE", "striped")]).unwrap();
        let storage = open_storage(&config).await.unwrap();
        assert_eq!(storage.serializer.name(), "striped");
        assert_eq!(storage.rockets.count().await.unwrap(), 0);
        storage.close().await;
    }
}
