//! Configuration for AtlasLock
//!
//! Centralized configuration with sensible defaults.
//!
//! There is no process-wide pool or policy: every `LockCoordinator`,
//! `ConnectionPool` and `Server` is built from an explicit `Config`, so
//! several independently configured instances can live in one process.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};

/// Default lease: 5 minutes
pub const DEFAULT_LEASE_MS: u64 = 5 * 60 * 1000;

/// Default poll interval while waiting for a held lock
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Default acquisition budget: 5 minutes
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Longest lease a store can report back through PTTL (i64 milliseconds)
pub const MAX_LEASE_MS: u64 = i64::MAX as u64;

/// Lease and wait budget applied to one acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPolicy {
    /// TTL attached to the lock record
    pub lease: Duration,

    /// Sleep between attempts in `acquire_with_wait`
    pub poll_interval: Duration,

    /// Total wall-clock budget for `acquire_with_wait`
    pub acquire_timeout: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            lease: Duration::from_millis(DEFAULT_LEASE_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
        }
    }
}

impl LockPolicy {
    /// Policy from millisecond values
    pub fn from_millis(lease_ms: u64, poll_interval_ms: u64, acquire_timeout_ms: u64) -> Self {
        Self {
            lease: Duration::from_millis(lease_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
        }
    }

    /// Same policy with a different lease
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Reject policies the store cannot express
    pub fn validate(&self) -> Result<()> {
        validate_lease(self.lease)?;
        if self.poll_interval.is_zero() {
            return Err(LockError::Config("poll interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Check a lease is non-zero and no longer than `MAX_LEASE_MS`
///
/// Sub-millisecond leases are accepted; stores round them up to 1ms.
pub(crate) fn validate_lease(lease: Duration) -> Result<()> {
    if lease.is_zero() {
        return Err(LockError::Config("lease must be non-zero".to_string()));
    }
    if lease.as_millis() > MAX_LEASE_MS as u128 {
        return Err(LockError::Config(format!(
            "lease of {:?} exceeds the maximum of {}ms",
            lease, MAX_LEASE_MS
        )));
    }
    Ok(())
}

/// Connection pool sizing and borrow behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on open connections (idle + borrowed)
    pub max_size: usize,

    /// Connections opened eagerly when the pool is built
    pub min_idle: usize,

    /// How long `get()` waits for a free connection before giving up
    pub connection_timeout: Duration,

    /// Validate idle connections before handing them out
    pub test_on_borrow: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            min_idle: 0,
            connection_timeout: Duration::from_millis(2000),
            test_on_borrow: false,
        }
    }
}

/// Main configuration for AtlasLock
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Lock Configuration
    // -------------------------------------------------------------------------
    /// Default policy used by `LockCoordinator` convenience methods
    pub lock_policy: LockPolicy,

    // -------------------------------------------------------------------------
    // Client Configuration
    // -------------------------------------------------------------------------
    /// Store address clients connect to (host:port, or a redis:// URL)
    pub store_addr: String,

    /// Client connection pool
    pub pool: PoolConfig,

    /// Client socket read/write timeout (milliseconds, 0 = none)
    pub client_io_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Engine Configuration
    // -------------------------------------------------------------------------
    /// How often the server purges expired keys (milliseconds)
    pub reaper_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_policy: LockPolicy::default(),
            store_addr: "127.0.0.1:7379".to_string(),
            pool: PoolConfig::default(),
            client_io_timeout_ms: 5000,
            reaper_interval_ms: 100,
            listen_addr: "127.0.0.1:7379".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would otherwise fail at first use
    pub fn validate(&self) -> Result<()> {
        self.lock_policy.validate()?;
        if self.pool.max_size == 0 {
            return Err(LockError::Config("pool max_size must be at least 1".to_string()));
        }
        if self.pool.min_idle > self.pool.max_size {
            return Err(LockError::Config(format!(
                "pool min_idle ({}) exceeds max_size ({})",
                self.pool.min_idle, self.pool.max_size
            )));
        }
        if self.reaper_interval_ms == 0 {
            return Err(LockError::Config("reaper interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the whole lock policy
    pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
        self.config.lock_policy = policy;
        self
    }

    /// Set the lease duration (in milliseconds)
    pub fn lease_ms(mut self, ms: u64) -> Self {
        self.config.lock_policy.lease = Duration::from_millis(ms);
        self
    }

    /// Set the poll interval (in milliseconds)
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.lock_policy.poll_interval = Duration::from_millis(ms);
        self
    }

    /// Set the acquire timeout (in milliseconds)
    pub fn acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lock_policy.acquire_timeout = Duration::from_millis(ms);
        self
    }

    /// Set the store address clients connect to
    pub fn store_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.store_addr = addr.into();
        self
    }

    /// Set the maximum number of pooled connections
    pub fn pool_max_size(mut self, size: usize) -> Self {
        self.config.pool.max_size = size;
        self
    }

    /// Set the number of connections opened up front
    pub fn pool_min_idle(mut self, count: usize) -> Self {
        self.config.pool.min_idle = count;
        self
    }

    /// Set how long a borrow waits for a free connection (in milliseconds)
    pub fn pool_connection_timeout_ms(mut self, ms: u64) -> Self {
        self.config.pool.connection_timeout = Duration::from_millis(ms);
        self
    }

    /// Validate idle connections before handing them out
    pub fn pool_test_on_borrow(mut self, enabled: bool) -> Self {
        self.config.pool.test_on_borrow = enabled;
        self
    }

    /// Set the client socket timeout (in milliseconds)
    pub fn client_io_timeout_ms(mut self, ms: u64) -> Self {
        self.config.client_io_timeout_ms = ms;
        self
    }

    /// Set the expired-key purge interval (in milliseconds)
    pub fn reaper_interval_ms(mut self, ms: u64) -> Self {
        self.config.reaper_interval_ms = ms;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
