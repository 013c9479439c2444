//! Shared navigation state.
//!
//! The [`Blackboard`] holds one [`NavInfo`] per slot. Each slot writes only
//! its own record; readers take a merged copy. The lock is held for one
//! merge or one field update at a time and never across an `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use glidelink_core::types::NavInfo;
use tokio::sync::Notify;
use tokio::time::Instant;

struct Records {
    slots: Vec<NavInfo>,
    /// Bumped by every [`Blackboard::schedule_merge`].
    epoch: u64,
}

/// Per-slot navigation records plus the "needs merge" signal.
pub struct Blackboard {
    records: Mutex<Records>,
    merge: Notify,
    origin: Instant,
}

impl Blackboard {
    /// A blackboard with `slots` empty records.
    pub fn new(slots: usize) -> Self {
        Blackboard {
            records: Mutex::new(Records {
                slots: vec![NavInfo::default(); slots],
                epoch: 0,
            }),
            merge: Notify::new(),
            origin: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Monotonic seconds since the blackboard was created.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Run `f` on slot `index`'s record under the lock.
    pub fn with_slot<R>(&self, index: usize, f: impl FnOnce(&mut NavInfo) -> R) -> Option<R> {
        let mut records = self.lock();
        records.slots.get_mut(index).map(f)
    }

    /// A copy of slot `index`'s record.
    pub fn slot(&self, index: usize) -> Option<NavInfo> {
        self.lock().slots.get(index).cloned()
    }

    /// Clear slot `index`'s record and signal a merge.
    pub fn reset_slot(&self, index: usize) {
        self.with_slot(index, NavInfo::reset);
        self.schedule_merge();
    }

    /// Every slot's record combined, lower index first: each field comes
    /// from the first slot that has it.
    pub fn merged(&self) -> NavInfo {
        let records = self.lock();
        let mut merged = NavInfo::default();
        for info in &records.slots {
            merged.complement(info);
        }
        merged
    }

    /// Signal that the merged state has changed.
    pub fn schedule_merge(&self) {
        self.lock().epoch += 1;
        self.merge.notify_one();
    }

    /// Resolves after the next [`schedule_merge`](Self::schedule_merge), or
    /// immediately if one happened since the last call.
    pub async fn merge_requested(&self) {
        self.merge.notified().await;
    }

    /// Number of merges requested so far.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }
}

impl std::fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blackboard")
            .field("slots", &self.len())
            .field("epoch", &self.epoch())
            .finish()
    }
}
