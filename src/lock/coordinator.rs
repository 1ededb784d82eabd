//! Lock Coordinator
//!
//! Implements the acquire/release protocol on top of a `KvStore`.
//!
//! ## Protocol
//! - Acquire: `conditional_set(key, token, lease)`; success means we own it
//! - Release: `compare_and_delete(key, token)`; only our own record goes
//! - Expiry: the store drops the record after `lease` no matter what
//!
//! ## Per-key State (as seen through the store)
//! ```text
//!            conditional_set ok
//!   FREE ─────────────────────────▶ HELD(token)
//!    ▲                                  │
//!    └──── TTL expiry, or release ◀─────┘
//!          with matching token
//! ```
//! A held key never changes owner directly: every acquire attempt against
//! it fails until it goes back to FREE.
//!
//! The coordinator keeps no mutable state of its own. Concurrent callers
//! only meet inside the store's atomic operations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{validate_lease, Config, LockPolicy};
use crate::error::{LockError, Result};
use crate::store::{KeyTtl, KvStore};

use super::{CancelToken, LockGuard, LockHandle, OwnershipToken};

/// Acquires and releases leased locks against a shared store
pub struct LockCoordinator<S: KvStore> {
    store: Arc<S>,
    policy: LockPolicy,
}

impl<S: KvStore> Clone for LockCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<S: KvStore> LockCoordinator<S> {
    /// Coordinator with the default policy (lease 300s, poll 10ms, timeout 300s)
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            policy: LockPolicy::default(),
        }
    }

    /// Coordinator with an explicit default policy
    pub fn with_policy(store: S, policy: LockPolicy) -> Result<Self> {
        Self::from_shared(Arc::new(store), policy)
    }

    /// Coordinator over a store shared with other components
    pub fn from_shared(store: Arc<S>, policy: LockPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { store, policy })
    }

    /// Coordinator using `config.lock_policy`
    pub fn from_config(store: S, config: &Config) -> Result<Self> {
        Self::with_policy(store, config.lock_policy)
    }

    /// Default policy for the `*_default` methods
    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    /// One conditional-set attempt, no retries
    ///
    /// Returns true iff the key was absent and now holds `token`.
    pub fn try_acquire_once(&self, key: &str, token: &OwnershipToken, lease: Duration) -> Result<bool> {
        self.store.conditional_set(key, &token.as_stored(), lease)
    }

    /// Non-blocking acquire
    ///
    /// Fails with `AlreadyLocked` if another holder has the key.
    pub fn acquire(&self, key: &str, lease: Duration) -> Result<LockHandle> {
        validate_lease(lease)?;
        let token = OwnershipToken::mint();

        if self.try_acquire_once(key, &token, lease)? {
            tracing::debug!(key, token = %token, lease_ms = lease.as_millis() as u64, "Lock acquired");
            Ok(LockHandle::new(key.to_string(), token, lease))
        } else {
            tracing::trace!(key, "Lock already held");
            Err(LockError::AlreadyLocked {
                key: key.to_string(),
            })
        }
    }

    /// Non-blocking acquire with the coordinator's lease
    pub fn acquire_default(&self, key: &str) -> Result<LockHandle> {
        self.acquire(key, self.policy.lease)
    }

    /// Blocking acquire: poll until acquired, timed out, or cancelled
    ///
    /// One token is minted for the whole call, so whichever poll succeeds
    /// the record is attributable to this call. Between polls, a record
    /// found without any expiry gets `policy.lease` imposed on it, so a key
    /// written without a lease cannot block waiters forever.
    ///
    /// No fairness: any waiter may win a given round.
    pub fn acquire_with_wait(
        &self,
        key: &str,
        policy: &LockPolicy,
        cancel: &CancelToken,
    ) -> Result<LockHandle> {
        policy.validate()?;
        let started = Instant::now();
        let token = OwnershipToken::mint();
        let mut attempts: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(key, attempts, "Lock wait cancelled");
                return Err(LockError::Cancelled {
                    key: key.to_string(),
                });
            }

            attempts += 1;
            if self.try_acquire_once(key, &token, policy.lease)? {
                tracing::debug!(
                    key,
                    token = %token,
                    attempts,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Lock acquired"
                );
                return Ok(LockHandle::new(key.to_string(), token, policy.lease));
            }

            self.impose_missing_lease(key, policy.lease)?;

            let waited = started.elapsed();
            if waited >= policy.acquire_timeout {
                tracing::debug!(key, attempts, waited_ms = waited.as_millis() as u64, "Lock wait timed out");
                return Err(LockError::AcquireTimeout {
                    key: key.to_string(),
                    waited,
                });
            }

            let nap = policy.poll_interval.min(policy.acquire_timeout - waited);
            if !cancel.sleep(nap) {
                tracing::debug!(key, attempts, "Lock wait cancelled");
                return Err(LockError::Cancelled {
                    key: key.to_string(),
                });
            }
        }
    }

    /// Blocking acquire with the coordinator's policy and no cancellation
    pub fn acquire_with_wait_default(&self, key: &str) -> Result<LockHandle> {
        self.acquire_with_wait(key, &self.policy, &CancelToken::never())
    }

    /// Put a lease on a record that has none
    fn impose_missing_lease(&self, key: &str, lease: Duration) -> Result<()> {
        if self.store.ttl(key)? == KeyTtl::Persistent {
            tracing::warn!(
                key,
                lease_ms = lease.as_millis() as u64,
                "Lock record has no expiry; imposing lease"
            );
            self.store.expire(key, lease)?;
        }
        Ok(())
    }

    // =========================================================================
    // Release & Renewal
    // =========================================================================

    /// Release a lock if, and only if, this handle still owns it
    ///
    /// Returns false when the record expired, was taken over by another
    /// holder after expiry, or never existed. Releasing twice is safe; the
    /// second call returns false.
    pub fn release(&self, handle: &LockHandle) -> Result<bool> {
        let released = self
            .store
            .compare_and_delete(handle.key(), &handle.token().as_stored())?;

        if released {
            tracing::debug!(key = handle.key(), token = %handle.token(), "Lock released");
        } else {
            tracing::debug!(
                key = handle.key(),
                token = %handle.token(),
                "Lock not released: record expired or owned by another holder"
            );
        }
        Ok(released)
    }

    /// Extend the lease, if this handle still owns the lock
    ///
    /// Returns false if ownership was already lost; the record is untouched.
    pub fn renew(&self, handle: &mut LockHandle, lease: Duration) -> Result<bool> {
        validate_lease(lease)?;
        let renewed = self
            .store
            .compare_and_expire(handle.key(), &handle.token().as_stored(), lease)?;

        if renewed {
            handle.renewed(lease);
            tracing::trace!(key = handle.key(), lease_ms = lease.as_millis() as u64, "Lock lease renewed");
        }
        Ok(renewed)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Check if the store still holds this handle's token
    pub fn is_held(&self, handle: &LockHandle) -> Result<bool> {
        let current = self.store.get(handle.key())?;
        Ok(current.as_deref() == Some(handle.token().as_stored().as_str()))
    }

    /// Check if anyone holds `key`
    pub fn is_locked(&self, key: &str) -> Result<bool> {
        Ok(self.store.get(key)?.is_some())
    }

    /// Token currently stored under `key`
    pub fn holder(&self, key: &str) -> Result<Option<String>> {
        self.store.get(key)
    }

    // =========================================================================
    // Scoped Locking
    // =========================================================================

    /// Blocking acquire returning a guard that releases on drop
    pub fn lock(&self, key: &str) -> Result<LockGuard<'_, S>> {
        let handle = self.acquire_with_wait_default(key)?;
        Ok(LockGuard::new(self, handle))
    }

    /// Non-blocking acquire returning a guard that releases on drop
    pub fn try_lock(&self, key: &str) -> Result<LockGuard<'_, S>> {
        let handle = self.acquire_default(key)?;
        Ok(LockGuard::new(self, handle))
    }

    /// Run `f` while holding `key`, releasing afterwards
    ///
    /// The lock is released even if `f` panics. A release error is
    /// returned in place of `f`'s value.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce(&LockHandle) -> T) -> Result<T> {
        let guard = self.lock(key)?;
        let value = f(guard.handle());

        if !guard.unlock()? {
            tracing::warn!(key, "Lease expired before the critical section finished");
        }
        Ok(value)
    }
}
