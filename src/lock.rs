//! Per-owner serialization of configuration edits.
//!
//! Each owner id gets its own mutex; edits for different owners never wait
//! on each other. Acquisition polls with a bounded timeout and reports
//! contention once it lasts longer than a threshold.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {timeout:?} waiting for the lock of owner '{owner_id}'")]
    Timeout { owner_id: String, timeout: Duration },
}

/// Runs a closure while holding the lock for one owner.
pub trait OwnerLock {
    /// Run `f` with the owner's lock held. The lock is released when `f`
    /// returns, whatever it returns.
    fn with_owner_lock<R>(&self, owner_id: &str, f: impl FnOnce() -> R) -> Result<R, LockError>;
}

/// In-process lock table keyed by owner id.
#[derive(Debug)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    timeout: Duration,
    warn_after: Duration,
}

impl OwnerLocks {
    /// Interval between acquisition attempts
    const POLL_INTERVAL: Duration = Duration::from_millis(5);

    pub fn new(timeout: Duration, warn_after: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
            warn_after,
        }
    }

    fn lock_for(&self, owner_id: &str) -> Arc<Mutex<()>> {
        // The table only holds Arcs; a panic elsewhere cannot leave it torn.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(owner_id.to_string()).or_default())
    }

    /// Give back an owner's lock, dropping its table entry once nobody else
    /// holds or waits on it. Clones are only taken under the table lock, so
    /// a count of one there means the entry is idle.
    fn release(&self, owner_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(owner_id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(owner_id);
        }
    }
}

impl Default for OwnerLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_millis(500))
    }
}

impl OwnerLock for OwnerLocks {
    fn with_owner_lock<R>(&self, owner_id: &str, f: impl FnOnce() -> R) -> Result<R, LockError> {
        let lock = self.lock_for(owner_id);
        let start = Instant::now();
        let mut warned = false;

        let guard = loop {
            match lock.try_lock() {
                Ok(guard) => break guard,
                // The guarded value is `()`, so a panicked holder left nothing torn.
                Err(TryLockError::Poisoned(poisoned)) => break poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {}
            }

            let waited = start.elapsed();
            if !warned && waited >= self.warn_after {
                tracing::warn!(
                    target: "studio_routing::lock",
                    owner_id,
                    waited_ms = waited.as_millis() as u64,
                    "owner lock contention, waiting"
                );
                warned = true;
            }
            if waited >= self.timeout {
                self.release(owner_id, lock);
                return Err(LockError::Timeout {
                    owner_id: owner_id.to_string(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(Self::POLL_INTERVAL);
        };

        if warned {
            tracing::info!(
                target: "studio_routing::lock",
                owner_id,
                waited_ms = start.elapsed().as_millis() as u64,
                "owner lock acquired after contention"
            );
        }

        let result = f();
        drop(guard);
        self.release(owner_id, lock);
        Ok(result)
    }
}
