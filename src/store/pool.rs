//! Connection Pool
//!
//! Bounded, thread-safe pool of store connections.
//!
//! ## Borrow Discipline
//! - `get()` hands out a `PooledConnection` guard
//! - The guard returns its connection on drop, on every exit path
//!   (normal return, `?` propagation, panic unwinding)
//! - A guard marked broken discards its connection instead
//!
//! ## Capacity
//! Slots are tokens in a bounded crossbeam channel of `max_size` entries.
//! Borrowing takes a token (waiting up to `connection_timeout`), dropping a
//! guard puts it back. Exhaustion surfaces as `ConnectionUnavailable`.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::error::{LockError, Result};

/// Opens and validates connections for a `ConnectionPool`
pub trait ManageConnection: Send + Sync + 'static {
    /// The pooled connection type
    type Connection: Send + 'static;

    /// Open a new connection
    fn connect(&self) -> Result<Self::Connection>;

    /// Check that an idle connection is still usable
    fn is_valid(&self, conn: &mut Self::Connection) -> Result<()>;
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    /// Open connections (idle + borrowed)
    pub connections: usize,

    /// Connections sitting idle in the pool
    pub idle: usize,
}

struct SharedPool<M: ManageConnection> {
    manager: M,
    config: PoolConfig,
    idle: Mutex<Vec<M::Connection>>,
    slot_tx: Sender<()>,
    slot_rx: Receiver<()>,
    open: AtomicUsize,
    closed: AtomicBool,
}

impl<M: ManageConnection> SharedPool<M> {
    fn return_slot(&self) {
        // Capacity equals the number of tokens ever issued, so this never blocks
        let _ = self.slot_tx.try_send(());
    }

    fn discard(&self, conn: M::Connection) {
        drop(conn);
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A bounded pool of store connections
///
/// Cheap to clone; clones share the same connections.
pub struct ConnectionPool<M: ManageConnection> {
    shared: Arc<SharedPool<M>>,
}

impl<M: ManageConnection> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// Build a pool, opening `min_idle` connections up front
    pub fn new(manager: M, config: PoolConfig) -> Result<Self> {
        if config.max_size == 0 {
            return Err(LockError::Config("pool max_size must be at least 1".to_string()));
        }
        if config.min_idle > config.max_size {
            return Err(LockError::Config(format!(
                "pool min_idle ({}) exceeds max_size ({})",
                config.min_idle, config.max_size
            )));
        }

        let (slot_tx, slot_rx) = channel::bounded(config.max_size);
        for _ in 0..config.max_size {
            slot_tx
                .try_send(())
                .map_err(|e| LockError::Config(format!("pool slot init failed: {}", e)))?;
        }

        let mut idle = Vec::with_capacity(config.max_size);
        for _ in 0..config.min_idle {
            idle.push(manager.connect()?);
        }
        let open = idle.len();

        tracing::info!(
            max_size = config.max_size,
            min_idle = config.min_idle,
            "Connection pool initialized"
        );

        Ok(Self {
            shared: Arc::new(SharedPool {
                manager,
                config,
                idle: Mutex::new(idle),
                slot_tx,
                slot_rx,
                open: AtomicUsize::new(open),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Borrow a connection
    ///
    /// Waits up to `connection_timeout` for a free slot. Reuses an idle
    /// connection when one exists, otherwise opens a new one.
    pub fn get(&self) -> Result<PooledConnection<M>> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            return Err(LockError::ConnectionUnavailable("pool is closed".to_string()));
        }

        match shared.slot_rx.recv_timeout(shared.config.connection_timeout) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => {
                return Err(LockError::ConnectionUnavailable(format!(
                    "pool exhausted: no connection free after {:?}",
                    shared.config.connection_timeout
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(LockError::ConnectionUnavailable("pool is closed".to_string()));
            }
        }

        // From here on the slot must go back on every failure path
        if shared.closed.load(Ordering::Acquire) {
            shared.return_slot();
            return Err(LockError::ConnectionUnavailable("pool is closed".to_string()));
        }

        match self.checkout() {
            Ok(conn) => Ok(PooledConnection {
                pool: Arc::clone(shared),
                conn: Some(conn),
                broken: false,
            }),
            Err(e) => {
                shared.return_slot();
                Err(e)
            }
        }
    }

    /// Pop a usable idle connection or open a fresh one
    fn checkout(&self) -> Result<M::Connection> {
        let shared = &self.shared;

        loop {
            let candidate = shared.idle.lock().pop();
            let Some(mut conn) = candidate else { break };

            if !shared.config.test_on_borrow {
                return Ok(conn);
            }
            match shared.manager.is_valid(&mut conn) {
                Ok(()) => return Ok(conn),
                Err(e) => {
                    tracing::debug!("Discarding idle connection that failed validation: {}", e);
                    shared.discard(conn);
                }
            }
        }

        let conn = shared.manager.connect().map_err(|e| match e {
            LockError::ConnectionUnavailable(_) => e,
            other => LockError::ConnectionUnavailable(other.to_string()),
        })?;
        shared.open.fetch_add(1, Ordering::AcqRel);
        Ok(conn)
    }

    /// Current occupancy
    pub fn state(&self) -> PoolState {
        PoolState {
            connections: self.shared.open.load(Ordering::Acquire),
            idle: self.shared.idle.lock().len(),
        }
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Check if `close` has been called
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Tear the pool down
    ///
    /// Idle connections are dropped now, borrowed ones when their guards
    /// drop. Later borrows fail with `ConnectionUnavailable`.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<M::Connection> = self.shared.idle.lock().drain(..).collect();
        for conn in drained {
            self.shared.discard(conn);
        }
        tracing::info!("Connection pool closed");
    }

    /// The connection manager
    pub fn manager(&self) -> &M {
        &self.shared.manager
    }
}

/// A borrowed connection, returned to the pool on drop
pub struct PooledConnection<M: ManageConnection> {
    pool: Arc<SharedPool<M>>,
    conn: Option<M::Connection>,
    broken: bool,
}

impl<M: ManageConnection> PooledConnection<M> {
    /// Discard this connection on drop instead of returning it
    ///
    /// Use after an I/O failure left the connection in an unknown state.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        // Only taken in drop
        self.conn.as_ref().expect("pooled connection already returned")
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("pooled connection already returned")
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken || self.pool.closed.load(Ordering::Acquire) {
                self.pool.discard(conn);
            } else {
                self.pool.idle.lock().push(conn);
            }
        }
        self.pool.return_slot();
    }
}
