//! Resource-scoped mutation locks.
//!
//! Every state-changing resource operation holds an exclusive lock keyed by the
//! resource identity for the duration of the remote call. Locks are:
//!
//! - **exclusive** per key, with no reader side (reads don't lock),
//! - **bounded**: a waiter gives up after the service timeout,
//! - **not reentrant**: locking a key twice from one thread waits for the
//!   timeout like any other contender.
//!
//! Acquisition returns a [`ResourceLockGuard`]. Dropping the guard releases the
//! lock, so every exit path of a critical section releases it. A guard can be
//! moved into a longer-lived owner (the output stream does this) to extend the
//! critical section past the acquiring call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::ResourceError;

/// One lock slot per held (or contended) key.
#[derive(Debug, Default)]
struct LockSlot {
    held: Mutex<bool>,
    released: Condvar,
}

/// Lock service shared by all resources of one provider.
///
/// Slots are created lazily on first use and dropped again once released
/// with no waiters.
#[derive(Debug)]
pub struct ResourceLockService {
    timeout: Duration,
    slots: DashMap<String, Arc<LockSlot>>,
}

impl ResourceLockService {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            slots: DashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire the lock for `key`, waiting up to the service timeout.
    pub fn lock(self: &Arc<Self>, key: &str) -> Result<ResourceLockGuard, ResourceError> {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_default()
            .clone();

        let deadline = Instant::now() + self.timeout;
        {
            let mut held = slot.held.lock();
            while *held {
                trace!(key = %key, "Waiting for resource lock");
                if slot.released.wait_until(&mut held, deadline).timed_out() && *held {
                    drop(held);
                    drop(slot);
                    self.discard_if_idle(key);
                    return Err(ResourceError::LockTimeout {
                        key: key.to_string(),
                        timeout: self.timeout,
                    });
                }
            }
            *held = true;
        }
        trace!(key = %key, "Acquired resource lock");

        Ok(ResourceLockGuard {
            service: Arc::clone(self),
            key: key.to_string(),
        })
    }

    /// Whether `key` is currently held.
    pub fn is_locked(&self, key: &str) -> bool {
        self.slots.get(key).is_some_and(|slot| *slot.held.lock())
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        self.slots.iter().filter(|slot| *slot.held.lock()).count()
    }

    fn unlock(&self, key: &str) {
        let Some(slot) = self.slots.get(key).map(|slot| Arc::clone(&slot)) else {
            return;
        };
        *slot.held.lock() = false;
        slot.released.notify_one();
        drop(slot);
        trace!(key = %key, "Released resource lock");
        self.discard_if_idle(key);
    }

    fn discard_if_idle(&self, key: &str) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1 && !*slot.held.lock());
    }
}

/// Exclusive hold on one resource key. Released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ResourceLockGuard {
    service: Arc<ResourceLockService>,
    key: String,
}

impl ResourceLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ResourceLockGuard {
    fn drop(&mut self) {
        self.service.unlock(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn service(timeout_ms: u64) -> Arc<ResourceLockService> {
        Arc::new(ResourceLockService::new(Duration::from_millis(timeout_ms)))
    }

    #[test]
    fn test_lock_and_release() {
        let locks = service(100);
        let guard = locks.lock("smb://host/share/a").unwrap();
        assert!(locks.is_locked("smb://host/share/a"));
        assert!(!locks.is_locked("smb://host/share/b"));
        assert_eq!(locks.held_count(), 1);
        drop(guard);
        assert!(!locks.is_locked("smb://host/share/a"));
        assert_eq!(locks.held_count(), 0);
        assert!(locks.slots.is_empty());
    }

    #[test]
    fn test_timeout_when_held() {
        let locks = service(30);
        let _guard = locks.lock("k").unwrap();
        let start = Instant::now();
        let err = locks.lock("k").unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(matches!(err, ResourceError::LockTimeout { ref key, .. } if key == "k"));
        assert!(locks.is_locked("k"));
    }

    #[test]
    fn test_distinct_keys_do_not_contend() {
        let locks = service(10);
        let _a = locks.lock("a").unwrap();
        let _b = locks.lock("b").unwrap();
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn test_waiter_acquires_after_release() {
        let locks = service(5_000);
        let guard = locks.lock("k").unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || locks.lock("k").map(|g| g.key().to_string()))
        };
        thread::sleep(Duration::from_millis(20));
        drop(guard);

        assert_eq!(waiter.join().unwrap().unwrap(), "k");
        assert!(!locks.is_locked("k"));
    }

    #[test]
    fn test_mutual_exclusion() {
        let locks = service(10_000);
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..20 {
                        let _guard = locks.lock("same").unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.held_count(), 0);
    }
}
