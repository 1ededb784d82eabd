//! Scoped lock guard
//!
//! Releases the lock when dropped. Release failures on drop cannot be
//! returned, so they are logged; call `unlock` to observe them.

use crate::error::Result;
use crate::store::KvStore;

use super::{LockCoordinator, LockHandle};

/// RAII guard over a held lock
pub struct LockGuard<'a, S: KvStore> {
    coordinator: &'a LockCoordinator<S>,
    handle: Option<LockHandle>,
}

impl<'a, S: KvStore> LockGuard<'a, S> {
    pub(crate) fn new(coordinator: &'a LockCoordinator<S>, handle: LockHandle) -> Self {
        Self {
            coordinator,
            handle: Some(handle),
        }
    }

    /// The handle this guard will release
    pub fn handle(&self) -> &LockHandle {
        // Only emptied by `unlock`/`into_handle`, which consume the guard
        self.handle.as_ref().expect("lock guard already released")
    }

    /// Release now, reporting whether we still owned the lock
    pub fn unlock(mut self) -> Result<bool> {
        match self.handle.take() {
            Some(handle) => self.coordinator.release(&handle),
            None => Ok(false),
        }
    }

    /// Disarm the guard and keep the lock held past its scope
    pub fn into_handle(mut self) -> LockHandle {
        self.handle.take().expect("lock guard already released")
    }
}

impl<S: KvStore> Drop for LockGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            match self.coordinator.release(&handle) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(key = handle.key(), "Lock lease expired before guard was dropped");
                }
                Err(e) => {
                    tracing::warn!(key = handle.key(), "Failed to release lock on drop: {}", e);
                }
            }
        }
    }
}
