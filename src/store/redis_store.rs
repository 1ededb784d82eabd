//! Redis KvStore
//!
//! Pooled client for a single Redis endpoint (feature `redis`).
//!
//! ## Command Mapping
//! - conditional_set    → `SET key value NX PX ms`
//! - get                → `GET key`
//! - compare_and_delete → Lua script (get + del in one server-side step)
//! - expire             → `PEXPIRE key ms`
//! - ttl                → `PTTL key`
//! - compare_and_expire → Lua script (get + pexpire in one server-side step)

use std::time::Duration;

use redis::{Client, Connection, Script, Value};

use crate::config::Config;
use crate::error::{LockError, Result};

use super::pool::{ConnectionPool, ManageConnection};
use super::{ttl_millis, KeyTtl, KvStore};

const COMPARE_AND_DELETE_SCRIPT: &str =
    "if redis.call('get', KEYS[1]) == ARGV[1] then return redis.call('del', KEYS[1]) else return 0 end";

const COMPARE_AND_EXPIRE_SCRIPT: &str =
    "if redis.call('get', KEYS[1]) == ARGV[1] then return redis.call('pexpire', KEYS[1], ARGV[2]) else return 0 end";

/// Opens Redis connections for the pool
pub struct RedisConnectionManager {
    client: Client,
    connect_timeout: Duration,
}

impl RedisConnectionManager {
    /// Manager for a `redis://` URL
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::open(url).map_err(|e| LockError::Config(e.to_string()))?;
        Ok(Self {
            client,
            connect_timeout,
        })
    }
}

impl ManageConnection for RedisConnectionManager {
    type Connection = Connection;

    fn connect(&self) -> Result<Connection> {
        self.client
            .get_connection_with_timeout(self.connect_timeout)
            .map_err(|e| LockError::ConnectionUnavailable(e.to_string()))
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<()> {
        redis::cmd("PING").query::<String>(conn)?;
        Ok(())
    }
}

/// KvStore backed by Redis
#[derive(Clone)]
pub struct RedisStore {
    pool: ConnectionPool<RedisConnectionManager>,
    compare_and_delete: Script,
    compare_and_expire: Script,
}

impl RedisStore {
    /// Build a store client from config (`store_addr` is a `redis://` URL)
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let manager = RedisConnectionManager::new(&config.store_addr, config.pool.connection_timeout)?;
        Ok(Self::with_pool(ConnectionPool::new(manager, config.pool)?))
    }

    /// Build a store client over an existing pool
    pub fn with_pool(pool: ConnectionPool<RedisConnectionManager>) -> Self {
        Self {
            pool,
            compare_and_delete: Script::new(COMPARE_AND_DELETE_SCRIPT),
            compare_and_expire: Script::new(COMPARE_AND_EXPIRE_SCRIPT),
        }
    }

    /// Release pooled connections
    pub fn close(&self) {
        self.pool.close();
    }

    /// Run `op` on a borrowed connection, discarding it if the call fails
    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> redis::RedisResult<T>) -> Result<T> {
        let mut conn = self.pool.get()?;
        op(&mut *conn).map_err(|e| {
            if e.is_io_error() || e.is_connection_dropped() {
                conn.mark_broken();
            }
            LockError::from(e)
        })
    }
}

impl KvStore for RedisStore {
    fn conditional_set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let reply: Option<String> = self.with_connection(|conn| {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query(conn)
        })?;
        Ok(reply.is_some_and(|r| r.eq_ignore_ascii_case("OK")))
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| redis::cmd("GET").arg(key).query(conn))
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let deleted: i64 = self.with_connection(|conn| {
            self.compare_and_delete.key(key).arg(expected).invoke(conn)
        })?;
        Ok(deleted == 1)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let updated: i64 = self.with_connection(|conn| {
            redis::cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)).query(conn)
        })?;
        Ok(updated == 1)
    }

    fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let pttl: i64 = self.with_connection(|conn| redis::cmd("PTTL").arg(key).query(conn))?;
        Ok(KeyTtl::from_pttl(pttl))
    }

    fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let updated: i64 = self.with_connection(|conn| {
            self.compare_and_expire
                .key(key)
                .arg(expected)
                .arg(ttl_millis(ttl))
                .invoke(conn)
        })?;
        Ok(updated == 1)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_connection(|conn| {
            redis::cmd("SET").arg(key).arg(value).query::<Value>(conn)
        })?;
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        self.with_connection(|conn| redis::cmd("PING").query::<String>(conn))?;
        Ok(())
    }
}
