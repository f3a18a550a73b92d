//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Parsing goes through an injectable
//! lookup, so [`QueueConfig::from_lookup`] can be exercised without
//! touching the process environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::persistence::CounterStrategy;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_TIME_ZONE: Tz = chrono_tz::Asia::Bangkok;

/// Configuration errors. Only values that are set but malformed fail;
/// missing values fall back to defaults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Parser message.
        message: String,
    },

    /// `STORAGE_BACKEND=postgres` without any database URL.
    #[error("postgres storage requires DATABASE_URL")]
    MissingDatabaseUrl,
}

/// Where queue state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL through `sqlx`.
    Postgres,
    /// Process-local store; state is lost on restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in_memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`QueueConfig::from_env`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Storage backend.
    pub storage_backend: StorageBackend,

    /// PostgreSQL connection string, if any was configured.
    pub database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Minimum idle connections in the pool.
    pub database_min_connections: u32,

    /// Timeout for acquiring a database connection.
    pub database_connect_timeout: Duration,

    /// Business time zone used for service dates and shift boundaries.
    pub time_zone: Tz,

    /// Lifetime of cached room status. Zero disables the cache.
    pub status_cache_ttl: Duration,

    /// How the daily counter is advanced.
    pub counter_strategy: CounterStrategy,

    /// Attempts per allocation before a counter conflict is surfaced.
    pub allocation_max_attempts: u32,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Per-request timeout applied by the HTTP stack.
    pub request_timeout: Duration,

    /// Allowed CORS origins. Empty means permissive.
    pub cors_allowed_origins: Vec<String>,

    /// Whether demo sites and rooms are created on an empty store.
    pub seed_demo_data: bool,

    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,
}

impl QueueConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is present but malformed, or
    /// when postgres storage is selected without a database URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = match (get("LISTEN_ADDR"), get("PORT")) {
            (Some(addr), _) => parse_value("LISTEN_ADDR", &addr)?,
            (None, Some(port)) => {
                let port: u16 = parse_value("PORT", &port)?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
            (None, None) => parse_value("LISTEN_ADDR", DEFAULT_LISTEN_ADDR)?,
        };

        let database_url = get("DATABASE_URL")
            .or_else(|| get("POSTGRES_URL"))
            .or_else(|| get("POSTGRESQL_URL"));

        let storage_backend = match get("STORAGE_BACKEND") {
            Some(raw) => parse_value("STORAGE_BACKEND", &raw)?,
            None if database_url.is_some() => StorageBackend::Postgres,
            None => StorageBackend::Memory,
        };
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let time_zone = match get("TIME_ZONE") {
            Some(raw) => parse_value("TIME_ZONE", raw.trim())?,
            None => DEFAULT_TIME_ZONE,
        };

        let counter_strategy = match get("COUNTER_STRATEGY") {
            Some(raw) => parse_value("COUNTER_STRATEGY", &raw)?,
            None => CounterStrategy::default(),
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            listen_addr,
            storage_backend,
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            database_min_connections: parse_or(&get, "DATABASE_MIN_CONNECTIONS", 2)?,
            database_connect_timeout: Duration::from_secs(parse_or(
                &get,
                "DATABASE_CONNECT_TIMEOUT_SECS",
                5,
            )?),
            time_zone,
            status_cache_ttl: Duration::from_millis(parse_or(&get, "STATUS_CACHE_TTL_MS", 3_000)?),
            counter_strategy,
            allocation_max_attempts: parse_or(&get, "ALLOCATION_MAX_ATTEMPTS", 3)?,
            event_bus_capacity: parse_or(&get, "EVENT_BUS_CAPACITY", 1_024)?,
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 30)?),
            cors_allowed_origins,
            seed_demo_data: parse_bool(&get, "SEED_DEMO_DATA", true)?,
            log_json: get("LOG_FORMAT").is_some_and(|v| v.trim().eq_ignore_ascii_case("json")),
        })
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}

/// Parses `key` as `T`, returning `default` when it is not set.
fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

/// Accepts `true`/`1`/`yes` and `false`/`0`/`no` (case-insensitive).
fn parse_bool<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got {other}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<QueueConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        QueueConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let Ok(config) = load(&[]) else {
            panic!("empty environment should load");
        };
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.time_zone, chrono_tz::Asia::Bangkok);
        assert_eq!(config.status_cache_ttl, Duration::from_millis(3_000));
        assert_eq!(config.counter_strategy, CounterStrategy::AtomicUpsert);
        assert_eq!(config.allocation_max_attempts, 3);
        assert!(config.cors_allowed_origins.is_empty());
        assert!(config.seed_demo_data);
        assert!(!config.log_json);
    }

    #[test]
    fn port_alone_binds_all_interfaces() {
        let Ok(config) = load(&[("PORT", "8080")]) else {
            panic!("PORT should parse");
        };
        assert_eq!(config.listen_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
    }

    #[test]
    fn database_url_fallbacks_select_postgres() {
        let Ok(config) = load(&[("POSTGRESQL_URL", "postgres://q@localhost/q")]) else {
            panic!("fallback url should load");
        };
        assert_eq!(config.storage_backend, StorageBackend::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://q@localhost/q"));
    }

    #[test]
    fn postgres_without_url_fails() {
        assert!(matches!(
            load(&[("STORAGE_BACKEND", "postgres")]),
            Err(ConfigError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn malformed_values_are_reported() {
        let Err(ConfigError::Invalid { key, .. }) = load(&[("TIME_ZONE", "Mars/Olympus")]) else {
            panic!("bad time zone should fail");
        };
        assert_eq!(key, "TIME_ZONE");
        assert!(load(&[("SEED_DEMO_DATA", "maybe")]).is_err());
        assert!(load(&[("COUNTER_STRATEGY", "optimistic")]).is_err());
    }

    #[test]
    fn parses_overrides() {
        let Ok(config) = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("DATABASE_URL", "postgres://ignored"),
            ("COUNTER_STRATEGY", "read_modify_write"),
            ("STATUS_CACHE_TTL_MS", "0"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("SEED_DEMO_DATA", "no"),
            ("LOG_FORMAT", "JSON"),
        ]) else {
            panic!("overrides should load");
        };
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.counter_strategy, CounterStrategy::ReadModifyWrite);
        assert_eq!(config.status_cache_ttl, Duration::ZERO);
        assert_eq!(config.cors_allowed_origins.len(), 2);
        assert!(!config.seed_demo_data);
        assert!(config.log_json);
    }
}
