//! Lock handles
//!
//! A `LockHandle` is the process-local capability returned by a successful
//! acquisition. It has no lifecycle of its own in the store; passing it to
//! `LockCoordinator::release` is the sanctioned way to end the lock early.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::OwnershipToken;

/// Proof of a successful acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHandle {
    key: String,
    token: OwnershipToken,
    acquired_at: SystemTime,
    lease: Duration,
}

impl LockHandle {
    pub(crate) fn new(key: String, token: OwnershipToken, lease: Duration) -> Self {
        Self {
            key,
            token,
            acquired_at: SystemTime::now(),
            lease,
        }
    }

    /// Rebuild a handle for a lock acquired elsewhere
    ///
    /// Release only succeeds if `token` is the value actually stored under
    /// `key`, so a forged handle cannot free someone else's lock.
    pub fn from_parts(
        key: impl Into<String>,
        token: OwnershipToken,
        acquired_at: SystemTime,
        lease: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            token,
            acquired_at,
            lease,
        }
    }

    /// The locked key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The ownership token written to the store
    pub fn token(&self) -> &OwnershipToken {
        &self.token
    }

    /// When the acquisition succeeded (local clock)
    pub fn acquired_at(&self) -> SystemTime {
        self.acquired_at
    }

    /// Lease requested at acquisition (or last renewal)
    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Locally estimated time left on the lease
    ///
    /// Advisory only: the store's TTL is authoritative, and clock skew
    /// between this process and the store is not accounted for.
    pub fn remaining_lease(&self) -> Duration {
        let elapsed = SystemTime::now()
            .duration_since(self.acquired_at)
            .unwrap_or_default();
        self.lease.saturating_sub(elapsed)
    }

    /// Check if the lease has run out by the local clock
    ///
    /// Work still running past this point may no longer be mutually exclusive.
    pub fn is_lease_expired(&self) -> bool {
        self.remaining_lease().is_zero()
    }

    /// Restart the local lease clock after a successful renewal
    pub(crate) fn renewed(&mut self, lease: Duration) {
        self.acquired_at = SystemTime::now();
        self.lease = lease;
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Encode the handle with bincode
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a handle produced by `to_bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Write the handle to a file so another process can release it
    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Read a handle written by `write_to`
    pub fn read_from(path: &Path) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }
}
