//! Cancellation for lock waits
//!
//! A `CancelSource` hands out `CancelToken`s. Cancelling the source (or
//! dropping it) disconnects the underlying crossbeam channel, which wakes
//! every token currently sleeping in `sleep` and makes later sleeps return
//! immediately.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// Owner side of a cancellation signal
#[derive(Debug)]
pub struct CancelSource {
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl CancelSource {
    /// Create a source that has not been cancelled
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// A token observing this source
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.receiver.clone(),
        }
    }

    /// Signal cancellation to every token
    pub fn cancel(&self) {
        self.sender.lock().take();
    }

    /// Check if `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiter side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: Receiver<()>,
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        Self {
            receiver: channel::never(),
        }
    }

    /// Sleep for `duration` unless cancelled first
    ///
    /// Returns false if the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        match self.receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => true,
            // Nothing is ever sent; any other outcome means the sender is gone
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Check for cancellation without sleeping
    pub fn is_cancelled(&self) -> bool {
        !self.sleep(Duration::ZERO)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}
