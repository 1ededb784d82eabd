//! Opt-in lease renewal
//!
//! Without a watchdog a lock simply expires after its lease, even if the
//! holder is still inside its critical section. A `Watchdog` runs a
//! background thread that renews the lease every `lease / 3` for as long as
//! the handle still owns the record.
//!
//! The thread exits when stopped, when a renewal reports that ownership
//! was lost, or when the local lease runs out while the store is failing.
//!
//! The watchdog renews its own copy of the handle. A copy kept by the
//! caller still carries the original `acquired_at`, so its
//! `is_lease_expired` goes stale while renewal runs; read the current
//! handle through `Watchdog::handle` or the one returned by `stop`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{LockError, Result};
use crate::store::KvStore;

use super::{CancelSource, LockCoordinator, LockHandle};

/// Background lease renewer for one lock
pub struct Watchdog {
    cancel: CancelSource,
    handle: Arc<Mutex<LockHandle>>,
    thread: Option<JoinHandle<bool>>,
}

impl Watchdog {
    /// Start renewing `handle` with its current lease length
    pub fn spawn<S: KvStore + 'static>(coordinator: LockCoordinator<S>, handle: LockHandle) -> Result<Self> {
        let lease = handle.lease();
        let interval = (lease / 3).max(Duration::from_millis(1));
        Self::spawn_with_interval(coordinator, handle, interval)
    }

    /// Start renewing `handle` every `interval`
    pub fn spawn_with_interval<S: KvStore + 'static>(
        coordinator: LockCoordinator<S>,
        handle: LockHandle,
        interval: Duration,
    ) -> Result<Self> {
        let cancel = CancelSource::new();
        let token = cancel.token();
        let lease = handle.lease();
        let name = format!("atlaslock-watchdog:{}", handle.key());
        let shared = Arc::new(Mutex::new(handle));
        let renewed = Arc::clone(&shared);

        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let mut current = renewed.lock().clone();
                // Outcome of the most recent renewal; none is due before the first tick
                let mut owned = true;

                loop {
                    if !token.sleep(interval) {
                        return owned;
                    }

                    match coordinator.renew(&mut current, lease) {
                        Ok(true) => {
                            owned = true;
                            *renewed.lock() = current.clone();
                        }
                        Ok(false) => {
                            tracing::warn!(key = current.key(), "Watchdog lost lock ownership; stopping");
                            return false;
                        }
                        Err(e) if current.is_lease_expired() => {
                            tracing::warn!(key = current.key(), "Watchdog gave up after lease ran out: {}", e);
                            return false;
                        }
                        Err(e) => {
                            owned = false;
                            tracing::warn!(key = current.key(), "Watchdog renewal failed, will retry: {}", e);
                        }
                    }
                }
            })
            .map_err(LockError::Io)?;

        Ok(Self {
            cancel,
            handle: shared,
            thread: Some(thread),
        })
    }

    /// The handle as of the last successful renewal
    pub fn handle(&self) -> LockHandle {
        self.handle.lock().clone()
    }

    /// Check if the renewal thread has exited on its own
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop renewing and wait for the thread
    ///
    /// Returns whether the most recent renewal succeeded (true if none was
    /// due yet), together with the handle as of the last successful renewal.
    /// A renewal that failed with a store error counts as not owned.
    pub fn stop(mut self) -> (bool, LockHandle) {
        let owned = self.shutdown();
        (owned, self.handle())
    }

    fn shutdown(&mut self) -> bool {
        self.cancel.cancel();
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or(false),
            None => false,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}
