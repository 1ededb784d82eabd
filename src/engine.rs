//! Engine Module
//!
//! The server-side store engine behind `atlaslock-server`.
//!
//! ## Responsibilities
//! - Execute protocol commands against the shared `MemoryStore`
//! - Purge expired keys in the background (active expiry)
//! - Stop the reaper on close
//!
//! ## Concurrency Model
//! Each command maps onto exactly one `MemoryStore` operation, and each of
//! those runs under the store's internal lock. That single lock is what
//! makes SET_NX_PX and COMPARE_AND_DEL atomic across all connections.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::lock::CancelSource;
use crate::protocol::{Command, Response};
use crate::store::{KvStore, MemoryStore};

/// Background thread purging expired keys
struct Reaper {
    cancel: CancelSource,
    thread: JoinHandle<()>,
}

/// The store engine
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Keyspace shared by every connection
    store: Arc<MemoryStore>,

    /// Expiry reaper, taken on close
    reaper: Mutex<Option<Reaper>>,
}

impl Engine {
    /// Create an engine with the given config
    ///
    /// Starts the reaper thread, which wakes every `reaper_interval_ms`.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(MemoryStore::new());
        let cancel = CancelSource::new();
        let token = cancel.token();
        let interval = Duration::from_millis(config.reaper_interval_ms);
        let reaper_store = Arc::clone(&store);

        let thread = thread::Builder::new()
            .name("atlaslock-reaper".to_string())
            .spawn(move || {
                while token.sleep(interval) {
                    let purged = reaper_store.purge_expired();
                    if purged > 0 {
                        tracing::trace!("Reaper purged {} expired keys", purged);
                    }
                }
            })?;

        tracing::debug!("Engine opened (reaper every {:?})", interval);

        Ok(Self {
            config,
            store,
            reaper: Mutex::new(Some(Reaper { cancel, thread })),
        })
    }

    /// Execute a command
    ///
    /// Routes commands to the matching store operation
    pub fn execute(&self, command: Command) -> Result<Response> {
        let store = &self.store;

        let response = match command {
            Command::Get { key } => match store.get(&key)? {
                Some(value) => Response::ok(Some(value.into_bytes())),
                None => Response::not_found(),
            },
            Command::SetNxPx { key, value, ttl_ms } => {
                Response::flag(store.conditional_set(&key, &value, Duration::from_millis(ttl_ms))?)
            }
            Command::CompareAndDelete { key, expected } => {
                Response::flag(store.compare_and_delete(&key, &expected)?)
            }
            Command::Ping => Response::ok(Some(b"PONG".to_vec())),
            Command::PExpire { key, ttl_ms } => {
                Response::flag(store.expire(&key, Duration::from_millis(ttl_ms))?)
            }
            Command::PTtl { key } => Response::integer(store.ttl(&key)?.to_pttl()),
            Command::CompareAndPExpire {
                key,
                expected,
                ttl_ms,
            } => Response::flag(store.compare_and_expire(
                &key,
                &expected,
                Duration::from_millis(ttl_ms),
            )?),
            Command::Set { key, value } => {
                store.set(&key, &value)?;
                Response::ok(None)
            }
        };

        Ok(response)
    }

    /// Stop the reaper and wait for it
    pub fn close(&self) {
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.cancel.cancel();
            if reaper.thread.join().is_err() {
                tracing::warn!("Reaper thread panicked");
            }
            tracing::debug!("Engine closed");
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// The shared keyspace
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        self.store.len()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}
