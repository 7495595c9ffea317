//! Capture lease: at most one capture cycle in flight.
//!
//! The lease moves `Idle → Capturing → Processing → Idle`. Release is tied
//! to a [`LeaseGuard`] so every exit path of a cycle (success, error, panic)
//! returns it to `Idle`. A timer armed at acquisition forces `Idle` after the
//! configured timeout in case the cycle hangs; a generation counter keeps a
//! stale timer or guard from releasing a newer cycle.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    #[default]
    Idle,
    /// The photo call is in flight.
    Capturing,
    /// Embedding extraction and gallery update are in flight.
    Processing,
}

#[derive(Debug, Default)]
struct LeaseInner {
    state: LeaseState,
    generation: u64,
}

/// Shared capture lease. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CaptureLease {
    inner: Arc<Mutex<LeaseInner>>,
    timeout: Duration,
}

impl CaptureLease {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LeaseInner::default())),
            timeout,
        }
    }

    // A panicking cycle must not wedge the lease.
    fn lock(&self) -> MutexGuard<'_, LeaseInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LeaseState {
        self.lock().state
    }

    pub fn is_idle(&self) -> bool {
        self.state() == LeaseState::Idle
    }

    /// Move `Idle → Capturing`. Returns `None` when a cycle is already in
    /// flight. Arms the timeout reset when called inside a tokio runtime.
    pub fn try_acquire(&self) -> Option<LeaseGuard> {
        let generation = {
            let mut inner = self.lock();
            if inner.state != LeaseState::Idle {
                return None;
            }
            inner.generation = inner.generation.wrapping_add(1);
            inner.state = LeaseState::Capturing;
            inner.generation
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lease = self.clone();
                let timeout = self.timeout;
                handle.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if lease.release(generation) {
                        tracing::warn!(
                            timeout_ms = timeout.as_millis() as u64,
                            "capture cycle timed out, lease forced idle"
                        );
                    }
                });
            }
            Err(_) => tracing::warn!("no runtime, capture lease timeout not armed"),
        }

        Some(LeaseGuard {
            lease: self.clone(),
            generation,
        })
    }

    fn transition(&self, generation: u64, to: LeaseState) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation || inner.state == LeaseState::Idle {
            return false;
        }
        inner.state = to;
        true
    }

    fn release(&self, generation: u64) -> bool {
        self.transition(generation, LeaseState::Idle)
    }
}

/// Ownership of the current capture cycle. Dropping it releases the lease.
#[derive(Debug)]
pub struct LeaseGuard {
    lease: CaptureLease,
    generation: u64,
}

impl LeaseGuard {
    /// Photo taken; move to `Processing`. Returns `false` when the lease was
    /// already forced idle by the timeout.
    pub fn set_processing(&self) -> bool {
        self.lease.transition(self.generation, LeaseState::Processing)
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.lease.release(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn lease_cycles_through_states() {
        let lease = CaptureLease::new(Duration::from_millis(1200));
        let guard = lease.try_acquire().unwrap();
        assert_eq!(lease.state(), LeaseState::Capturing);
        assert!(lease.try_acquire().is_none());

        assert!(guard.set_processing());
        assert_eq!(lease.state(), LeaseState::Processing);

        drop(guard);
        assert!(lease.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_cycle_is_forced_idle() {
        let lease = CaptureLease::new(Duration::from_millis(1200));
        let guard = lease.try_acquire().unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(lease.state(), LeaseState::Capturing);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(lease.is_idle());
        assert!(!guard.set_processing());

        // The stale guard must not release a newer cycle.
        let fresh = lease.try_acquire().unwrap();
        drop(guard);
        assert_eq!(lease.state(), LeaseState::Capturing);
        drop(fresh);
        assert!(lease.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_does_not_release_newer_cycle() {
        let lease = CaptureLease::new(Duration::from_millis(1200));
        drop(lease.try_acquire().unwrap());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let _second = lease.try_acquire().unwrap();

        // First timer fires at 1200 ms; the second cycle is only 600 ms old.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(lease.state(), LeaseState::Capturing);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(lease.is_idle());
    }

    #[tokio::test]
    async fn panicking_cycle_releases_lease() {
        let lease = CaptureLease::new(Duration::from_secs(60));
        let guard = lease.try_acquire().unwrap();

        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("cycle blew up");
        });
        assert!(task.await.is_err());
        assert!(lease.is_idle());
    }

    #[test]
    fn acquire_outside_runtime_still_guards() {
        let lease = CaptureLease::new(Duration::from_millis(10));
        let guard = lease.try_acquire().unwrap();
        assert!(lease.try_acquire().is_none());
        drop(guard);
        assert!(lease.is_idle());
    }
}
