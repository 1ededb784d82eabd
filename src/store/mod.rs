//! Store Module
//!
//! The key-value store contract the lock is built on, plus its adapters.
//!
//! ## Responsibilities
//! - Atomic "set if absent, with expiry" (lock acquisition)
//! - Atomic "delete if value matches" (lock release)
//! - TTL inspection and refresh
//! - Scoped connection borrowing (see `pool`)
//!
//! ## Adapters
//! - `MemoryStore`: in-process, used by tests and by the server engine
//! - `RemoteStore`: pooled TCP client for `atlaslock-server`
//! - `RedisStore`: pooled client for a Redis endpoint (feature `redis`)
//!
//! Every compound operation must execute as one indivisible step at the
//! store. A get followed by a separate delete is not a compare-and-delete.

mod memory;
pub mod pool;
mod remote;
#[cfg(feature = "redis")]
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

pub use memory::MemoryStore;
pub use pool::{ConnectionPool, ManageConnection, PoolState, PooledConnection};
pub use remote::{RemoteStore, TcpConnection, TcpConnectionManager};
#[cfg(feature = "redis")]
pub use redis_store::{RedisConnectionManager, RedisStore};

/// Expiry state of a key, as reported by `KvStore::ttl`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist
    Missing,

    /// Key exists with no expiry
    Persistent,

    /// Key exists and expires after the given duration
    Expires(Duration),
}

impl KeyTtl {
    /// Decode the Redis PTTL convention (-2 missing, -1 no expiry)
    pub fn from_pttl(pttl: i64) -> Self {
        match pttl {
            -1 => KeyTtl::Persistent,
            n if n < 0 => KeyTtl::Missing,
            n => KeyTtl::Expires(Duration::from_millis(n as u64)),
        }
    }

    /// Encode using the Redis PTTL convention
    pub fn to_pttl(self) -> i64 {
        match self {
            KeyTtl::Missing => -2,
            KeyTtl::Persistent => -1,
            KeyTtl::Expires(d) => d.as_millis().min(i64::MAX as u128) as i64,
        }
    }
}

/// Atomic primitives the lock coordinator depends on
///
/// Implementations borrow a connection per call and must return it on
/// every exit path. Failures surface as `LockError::ConnectionUnavailable`
/// (no connection could be obtained) or `LockError::StoreOperationFailed`
/// (the operation itself failed). Implementations never retry.
pub trait KvStore: Send + Sync {
    /// Set `key` to `value` with expiry `ttl` only if `key` is absent
    ///
    /// Returns whether the set happened.
    fn conditional_set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Current value of `key`, if present
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key` only if its current value equals `expected`
    ///
    /// Returns whether the delete happened.
    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Set or refresh the expiry of an existing key without touching its value
    ///
    /// Returns false if the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remaining time to live of `key`
    fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Refresh the expiry of `key` only if its value equals `expected`
    fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool>;

    /// Unconditional set with no expiry
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Round-trip health check
    fn ping(&self) -> Result<()>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn conditional_set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        (**self).conditional_set(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        (**self).compare_and_delete(key, expected)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        (**self).expire(key, ttl)
    }

    fn ttl(&self, key: &str) -> Result<KeyTtl> {
        (**self).ttl(key)
    }

    fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        (**self).compare_and_expire(key, expected, ttl)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn ping(&self) -> Result<()> {
        (**self).ping()
    }
}

impl<S: KvStore + ?Sized> KvStore for &S {
    fn conditional_set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        (**self).conditional_set(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        (**self).compare_and_delete(key, expected)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        (**self).expire(key, ttl)
    }

    fn ttl(&self, key: &str) -> Result<KeyTtl> {
        (**self).ttl(key)
    }

    fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        (**self).compare_and_expire(key, expected, ttl)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn ping(&self) -> Result<()> {
        (**self).ping()
    }
}

/// Milliseconds for a store TTL, rounding sub-millisecond leases up
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    let ms = ttl.as_millis().min(u64::MAX as u128) as u64;
    if ms == 0 && !ttl.is_zero() {
        1
    } else {
        ms
    }
}
