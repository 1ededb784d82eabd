//! In-memory KvStore
//!
//! HashMap with per-key deadlines behind a parking_lot RwLock.
//!
//! ## Expiry
//! - Lazy: an entry past its deadline is treated as absent by every operation
//! - Active: `purge_expired` removes dead entries (the engine's reaper calls it)
//!
//! Compound operations (conditional set, compare-and-delete,
//! compare-and-expire) run entirely under the write lock, which makes each of
//! them atomic with respect to every other operation on the store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::Result;

use super::{KeyTtl, KvStore};

/// A stored value and its optional deadline
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// Deadline `ttl` from `now`; None (never expires) if that overflows `Instant`
fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// In-process key-value store with TTLs
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, entry| entry.is_live(now));
        before - data.len()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.read().values().filter(|e| e.is_live(now)).count()
    }

    /// Check if no live keys remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all keys
    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// Live entry for `key`, dropping it if it has expired
    fn live_entry<'a>(
        data: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if data.get(key).is_some_and(|e| !e.is_live(now)) {
            data.remove(key);
        }
        data.get_mut(key)
    }
}

impl KvStore for MemoryStore {
    fn conditional_set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut data = self.data.write();

        if Self::live_entry(&mut data, key, now).is_some() {
            return Ok(false);
        }

        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: deadline(now, ttl),
            },
        );
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let data = self.data.read();
        Ok(data
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let now = Instant::now();
        let mut data = self.data.write();

        let owned = Self::live_entry(&mut data, key, now).is_some_and(|e| e.value == expected);
        if owned {
            data.remove(key);
        }
        Ok(owned)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut data = self.data.write();

        match Self::live_entry(&mut data, key, now) {
            Some(entry) => {
                entry.expires_at = deadline(now, ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let now = Instant::now();
        let data = self.data.read();

        Ok(match data.get(key).filter(|e| e.is_live(now)) {
            None => KeyTtl::Missing,
            Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(deadline),
                ..
            }) => KeyTtl::Expires(deadline.saturating_duration_since(now)),
        })
    }

    fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut data = self.data.write();

        match Self::live_entry(&mut data, key, now) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = deadline(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.data.write().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
