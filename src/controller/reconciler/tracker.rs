//! # Dependency Tracker
//!
//! Watch-on-read bookkeeping. Every engine read registers the read object
//! against the resource being reconciled; the watch loop asks the tracker
//! which resources depend on an object that changed and requeues them.
//!
//! Entries expire after a lease so dependencies a resource no longer reads
//! stop triggering it.

use super::store::ObjectKey;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Tracker {
    lease: Duration,
    state: Mutex<TrackerState>,
}

#[derive(Debug)]
struct TrackerState {
    // tracked object -> (dependent resource -> lease expiry)
    entries: HashMap<ObjectKey, HashMap<ObjectKey, Instant>>,
    next_prune: Instant,
}

impl TrackerState {
    /// Drop every expired lease, at most once per lease interval
    fn prune(&mut self, now: Instant, lease: Duration) {
        if now < self.next_prune {
            return;
        }
        self.entries.retain(|_, dependents| {
            dependents.retain(|_, expires| *expires > now);
            !dependents.is_empty()
        });
        self.next_prune = now + lease;
    }
}

impl Tracker {
    #[must_use]
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            state: Mutex::new(TrackerState {
                entries: HashMap::new(),
                next_prune: Instant::now() + lease,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `dependent` read `tracked`, renewing the lease
    ///
    /// Leases of objects that never change again, and of dependents that
    /// were deleted, are swept here.
    pub fn track(&self, tracked: &ObjectKey, dependent: &ObjectKey) {
        let now = Instant::now();
        let mut state = self.state();
        state.prune(now, self.lease);
        state
            .entries
            .entry(tracked.clone())
            .or_default()
            .insert(dependent.clone(), now + self.lease);
    }

    /// Resources whose lease on `tracked` is still live, sorted
    ///
    /// Expired entries are pruned.
    #[must_use]
    pub fn dependents(&self, tracked: &ObjectKey) -> Vec<ObjectKey> {
        let now = Instant::now();
        let mut state = self.state();
        let Some(dependents) = state.entries.get_mut(tracked) else {
            return Vec::new();
        };
        dependents.retain(|_, expires| *expires > now);
        let mut live: Vec<ObjectKey> = dependents.keys().cloned().collect();
        if dependents.is_empty() {
            state.entries.remove(tracked);
        }
        live.sort();
        live
    }

    /// Number of objects with at least one registered dependent
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.state().entries.len()
    }
}
