//! # AtlasLock
//!
//! A lease-based distributed lock over a shared key-value store, with:
//! - Atomic set-if-absent-with-expiry acquisition
//! - Token-checked (compare-and-delete) release
//! - Blocking acquisition with a poll budget and cancellation
//! - Opt-in lease renewal
//! - A bundled TCP store server, plus Redis support (feature `redis`)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     LockCoordinator                          │
//! │        acquire / acquire_with_wait / release / renew         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  KvStore trait
//!          ┌────────────┼─────────────────┐
//!          ▼            ▼                 ▼
//!   ┌─────────────┐ ┌─────────────┐ ┌─────────────┐
//!   │ MemoryStore │ │ RemoteStore │ │ RedisStore  │
//!   │ (in-proc)   │ │  (pooled)   │ │  (pooled)   │
//!   └─────────────┘ └──────┬──────┘ └─────────────┘
//!                          │ TCP
//!                          ▼
//!                  ┌───────────────┐
//!                  │    Server     │
//!                  │ Engine+Reaper │
//!                  └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod lock;
pub mod store;
pub mod network;
pub mod protocol;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LockError, Result};
pub use config::{Config, LockPolicy, PoolConfig};
pub use engine::Engine;
pub use lock::{CancelSource, CancelToken, LockCoordinator, LockGuard, LockHandle, OwnershipToken, Watchdog};
pub use store::{KeyTtl, KvStore, MemoryStore, RemoteStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasLock
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
