//! Connection pool for the database sink.
//!
//! Log writes are small and frequent, so the pool is kept modest and a
//! write that cannot get a connection quickly fails instead of stalling
//! the worker that issued it.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use logship_core::{defaults, Error, Result};
use logship_core::logging;

/// Pool settings for the database sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// How long an insert waits for a free connection.
    pub acquire_timeout: Duration,
    /// Idle connections above zero are closed after this long.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_millis(defaults::DB_ACQUIRE_TIMEOUT_MS),
            idle_timeout: Duration::from_secs(defaults::DB_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LOG_DB_MAX_CONNECTIONS` | `10` | Pool size |
    /// | `LOG_DB_ACQUIRE_TIMEOUT_MS` | `5000` | Wait for a free connection |
    pub fn from_env() -> Self {
        let max_connections = std::env::var("LOG_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::DB_MAX_CONNECTIONS)
            .max(1);

        let acquire_timeout_ms = std::env::var("LOG_DB_ACQUIRE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::DB_ACQUIRE_TIMEOUT_MS);

        Self {
            max_connections,
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(1);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Open the pool and verify one connection.
pub async fn create_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(0)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = logging::SUBSYSTEM_DB,
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
        duration_ms = start.elapsed().as_millis() as u64,
        "Log database pool ready"
    );
    Ok(pool)
}

/// Log pool occupancy after a failed insert. Exhaustion is the usual
/// cause of acquire timeouts, so it is reported at warn.
pub(crate) fn log_pool_state(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    if idle == 0 && size >= pool.options().get_max_connections() {
        warn!(
            subsystem = logging::SUBSYSTEM_DB,
            component = "pool",
            pool_size = size,
            "Log database pool exhausted"
        );
    } else {
        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            component = "pool",
            pool_size = size,
            pool_idle = idle,
            "Log database pool state"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_favor_short_waits() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, defaults::DB_MAX_CONNECTIONS);
        assert_eq!(
            config.acquire_timeout,
            Duration::from_millis(defaults::DB_ACQUIRE_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_builders_keep_at_least_one_connection() {
        let config = PoolConfig::default()
            .with_max_connections(0)
            .with_acquire_timeout(Duration::from_millis(250));
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
    }
}
