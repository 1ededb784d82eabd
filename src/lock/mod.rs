//! Lock Module
//!
//! Lease-based mutual exclusion across processes sharing one `KvStore`.
//!
//! ## Responsibilities
//! - Mint unguessable ownership tokens
//! - Acquire with a single conditional set, or poll until a budget runs out
//! - Release with an atomic compare-and-delete (never someone else's lock)
//! - Optional lease renewal (`Watchdog`)
//!
//! ## Lease Boundary
//! A lease expires unconditionally. Work that outlives it is no longer
//! exclusive unless a `Watchdog` keeps renewing it; `LockHandle`
//! exposes `remaining_lease` so callers can check.
//!
//! ## Usage
//! ```
//! use std::time::Duration;
//! use atlaslock::lock::LockCoordinator;
//! use atlaslock::store::MemoryStore;
//!
//! let coordinator = LockCoordinator::new(MemoryStore::new());
//! let handle = coordinator.acquire("res:1", Duration::from_secs(1)).unwrap();
//! // ... guarded work ...
//! assert!(coordinator.release(&handle).unwrap());
//! ```

mod cancel;
mod coordinator;
mod guard;
mod handle;
mod token;
mod watchdog;

pub use cancel::{CancelSource, CancelToken};
pub use coordinator::LockCoordinator;
pub use guard::LockGuard;
pub use handle::LockHandle;
pub use token::OwnershipToken;
pub use watchdog::Watchdog;
