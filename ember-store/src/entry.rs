//! Hot-tier cache entry.

use std::sync::atomic::{AtomicI64, Ordering};

use ember_common::clock::now_precise;

/// Sentinel heap position for entries without a TTL.
pub(crate) const HEAP_NONE: usize = usize::MAX;

/// One live key.
///
/// `expire_at` and `last_access` are atomics so the read fast path can stamp access time and
/// observe expiry under the shard's read lock. `value` and `heap_index` are only touched while
/// the shard's write lock is held.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) value: Vec<u8>,
    pub(crate) expire_at: AtomicI64,
    pub(crate) last_access: AtomicI64,
    pub(crate) heap_index: usize,
}

impl Entry {
    pub(crate) fn new(value: Vec<u8>, expire_at: i64, now: i64) -> Self {
        Self {
            value,
            expire_at: AtomicI64::new(expire_at),
            last_access: AtomicI64::new(now),
            heap_index: HEAP_NONE,
        }
    }

    pub(crate) fn expire_at(&self) -> i64 {
        self.expire_at.load(Ordering::Relaxed)
    }

    pub(crate) fn last_access(&self) -> i64 {
        self.last_access.load(Ordering::Relaxed)
    }

    pub(crate) fn touch(&self, now: i64) {
        self.last_access.store(now, Ordering::Relaxed);
    }

    pub(crate) fn is_expired_at(&self, now: i64) -> bool {
        let expire_at = self.expire_at();
        expire_at > 0 && now > expire_at
    }

    /// Checks TTL against the precise wall clock.
    pub(crate) fn is_expired(&self) -> bool {
        self.is_expired_at(now_precise())
    }
}
