//! Process configuration read from the environment.
//!
//! DESIGN
//! ======
//! `main` loads `.env` via `dotenvy`, then calls `AppConfig::from_env()` once
//! and hands the result to the store and router. Unset or unparsable tuning
//! knobs fall back to defaults; only `DATABASE_URL` (for the postgres
//! backend) and a bad `STORE_BACKEND` are hard errors.

use time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;
const DEFAULT_LIVE_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_MAX_OPEN_FLOWS: usize = 1024;
const DEFAULT_FLOW_TTL_MINUTES: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL required for the postgres store backend")]
    MissingDatabaseUrl,
    #[error("unknown STORE_BACKEND: {0}")]
    UnknownBackend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Some(Self::Postgres),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub session_ttl: Duration,
    pub cookie_secure: bool,
    pub live_channel_capacity: usize,
    /// Upper bound on parked unboxing flows; the oldest is evicted past it.
    pub max_open_flows: usize,
    /// Unfinished flows older than this are dropped on the next open.
    pub flow_ttl: Duration,
    /// Seeded on startup when both are set; admins cannot self-register.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl AppConfig {
    /// Read configuration from process environment.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown backend or a postgres backend
    /// without `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("STORE_BACKEND") {
            Ok(raw) => StoreBackend::parse(&raw).ok_or(ConfigError::UnknownBackend(raw))?,
            Err(_) => StoreBackend::Postgres,
        };
        let database_url = env_string("DATABASE_URL");
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self {
            port: env_parse("PORT", DEFAULT_PORT),
            backend,
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            session_ttl: Duration::hours(env_parse("SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS).max(1)),
            cookie_secure: env_bool("COOKIE_SECURE").unwrap_or(false),
            live_channel_capacity: env_parse("LIVE_CHANNEL_CAPACITY", DEFAULT_LIVE_CHANNEL_CAPACITY).max(1),
            max_open_flows: env_parse("MAX_OPEN_FLOWS", DEFAULT_MAX_OPEN_FLOWS).max(1),
            flow_ttl: Duration::minutes(env_parse("FLOW_TTL_MINUTES", DEFAULT_FLOW_TTL_MINUTES).max(1)),
            admin_email: env_string("ADMIN_EMAIL"),
            admin_password: env_string("ADMIN_PASSWORD"),
        })
    }

    /// Defaults for an in-memory deployment. Used by tests.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            port: DEFAULT_PORT,
            backend: StoreBackend::Memory,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            cookie_secure: false,
            live_channel_capacity: DEFAULT_LIVE_CHANNEL_CAPACITY,
            max_open_flows: DEFAULT_MAX_OPEN_FLOWS,
            flow_ttl: Duration::minutes(DEFAULT_FLOW_TTL_MINUTES),
            admin_email: None,
            admin_password: None,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
