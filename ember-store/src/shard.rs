//! One shard of the hot tier: a key→entry map plus its TTL heap under a single
//! reader/writer lock.
//!
//! The map and heap are only ever mutated together inside one critical section; any operation
//! touching an entry's TTL goes through [`repair_heap_at`] so the back-pointer invariant holds
//! after every mutation.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ember_common::clock::{now_cached, now_precise};
use ember_common::error::{EmberError, EmberResult};

use crate::cold::ColdRecord;
use crate::containers::HotMap;
use crate::entry::{Entry, HEAP_NONE};
use crate::glob::glob_match;
use crate::ttl_heap::TtlHeap;

#[derive(Debug, Default)]
pub(crate) struct Shard {
    inner: RwLock<ShardInner>,
}

#[derive(Debug, Default)]
pub(crate) struct ShardInner {
    items: HotMap<Vec<u8>, Entry>,
    heap: TtlHeap,
}

/// Applies the TTL-change heap rules: push when a TTL appears, re-heapify when it moves,
/// remove when it clears.
fn repair_heap_at(
    items: &mut HotMap<Vec<u8>, Entry>,
    heap: &mut TtlHeap,
    key: &[u8],
    index: usize,
    expire_at: i64,
) {
    if expire_at > 0 {
        if index == HEAP_NONE {
            heap.push(items, key.to_vec(), expire_at);
        } else {
            heap.repair(items, index, expire_at);
        }
    } else if index != HEAP_NONE {
        heap.remove(items, index);
    }
}

/// Removes an entry from both structures. Returns whether it existed.
fn remove_locked(items: &mut HotMap<Vec<u8>, Entry>, heap: &mut TtlHeap, key: &[u8]) -> bool {
    let Some(index) = items.get(key).map(|entry| entry.heap_index) else {
        return false;
    };
    if index != HEAP_NONE {
        heap.remove(items, index);
    }
    items.remove(key);
    true
}

impl Shard {
    fn read(&self) -> RwLockReadGuard<'_, ShardInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a value with an absolute expiry (zero = no TTL). Returns true for a new key.
    pub(crate) fn set(&self, key: &[u8], value: Vec<u8>, expire_at: i64) -> bool {
        let now = now_cached();
        let mut inner = self.write();
        let ShardInner { items, heap } = &mut *inner;

        if items.contains_key(key) {
            let index = {
                let entry = items.get_mut(key).expect("presence checked under this lock");
                entry.value = value;
                entry
                    .expire_at
                    .store(expire_at, std::sync::atomic::Ordering::Relaxed);
                entry.touch(now);
                entry.heap_index
            };
            repair_heap_at(items, heap, key, index, expire_at);
            return false;
        }

        items.insert(key.to_vec(), Entry::new(value, expire_at, now));
        if expire_at > 0 {
            heap.push(items, key.to_vec(), expire_at);
        }
        true
    }

    /// Reads a value, lazily expiring a dead entry.
    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        {
            let inner = self.read();
            let entry = inner.items.get(key)?;
            if !entry.is_expired_at(now_precise()) {
                let value = entry.value.clone();
                entry.touch(now_cached());
                return Some(value);
            }
        }

        // Expired on the fast path: re-check under the write lock before removing, the key may
        // have been refreshed while we waited.
        let mut inner = self.write();
        let ShardInner { items, heap } = &mut *inner;
        match items.get(key).map(Entry::is_expired) {
            None => None,
            Some(true) => {
                remove_locked(items, heap, key);
                None
            }
            Some(false) => {
                let entry = items.get(key).expect("presence checked under this lock");
                let value = entry.value.clone();
                entry.touch(now_cached());
                Some(value)
            }
        }
    }

    /// Removes a key. Returns whether it existed.
    pub(crate) fn del(&self, key: &[u8]) -> bool {
        let mut inner = self.write();
        let ShardInner { items, heap } = &mut *inner;
        remove_locked(items, heap, key)
    }

    /// Live-key presence check.
    pub(crate) fn exists(&self, key: &[u8]) -> bool {
        let inner = self.read();
        inner
            .items
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now_precise()))
    }

    /// Updates the TTL of a live entry (zero clears it). Returns whether the key was live.
    pub(crate) fn expire(&self, key: &[u8], expire_at: i64) -> bool {
        let mut inner = self.write();
        let ShardInner { items, heap } = &mut *inner;

        let index = match items.get(key) {
            Some(entry) if !entry.is_expired() => {
                entry
                    .expire_at
                    .store(expire_at, std::sync::atomic::Ordering::Relaxed);
                entry.heap_index
            }
            _ => return false,
        };
        repair_heap_at(items, heap, key, index, expire_at);
        true
    }

    /// Remaining lifetime in nanoseconds. `-1` for no TTL, `-2` for missing or expired.
    pub(crate) fn ttl_nanos(&self, key: &[u8]) -> i64 {
        let expire_at = {
            let inner = self.read();
            match inner.items.get(key) {
                Some(entry) => entry.expire_at(),
                None => return -2,
            }
        };

        if expire_at == 0 {
            return -1;
        }
        let remaining = expire_at - now_precise();
        if remaining <= 0 {
            return -2;
        }
        remaining
    }

    /// Adds `delta` to an integer value, recreating missing or expired keys from zero.
    ///
    /// # Errors
    ///
    /// Returns [`EmberError::NotAnInteger`] when the current value is not a signed 64-bit
    /// integer or the addition overflows.
    pub(crate) fn incr_by(&self, key: &[u8], delta: i64) -> EmberResult<(i64, bool)> {
        let now = now_cached();
        let mut inner = self.write();
        let ShardInner { items, heap } = &mut *inner;

        if items.get(key).is_some_and(Entry::is_expired) {
            remove_locked(items, heap, key);
        }

        match items.get_mut(key) {
            Some(entry) => {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|text| text.parse::<i64>().ok())
                    .ok_or(EmberError::NotAnInteger)?;
                let next = current.checked_add(delta).ok_or(EmberError::NotAnInteger)?;
                entry.value = next.to_string().into_bytes();
                entry.touch(now);
                Ok((next, false))
            }
            None => {
                items.insert(
                    key.to_vec(),
                    Entry::new(delta.to_string().into_bytes(), 0, now),
                );
                Ok((delta, true))
            }
        }
    }

    /// Appends to a value, creating missing or expired keys from the suffix. Returns the new
    /// length and whether the key is new.
    pub(crate) fn append_value(&self, key: &[u8], suffix: &[u8]) -> (usize, bool) {
        let now = now_cached();
        let mut inner = self.write();
        let ShardInner { items, heap } = &mut *inner;

        if items.get(key).is_some_and(Entry::is_expired) {
            remove_locked(items, heap, key);
        }

        match items.get_mut(key) {
            Some(entry) => {
                entry.value.extend_from_slice(suffix);
                entry.touch(now);
                (entry.value.len(), false)
            }
            None => {
                items.insert(key.to_vec(), Entry::new(suffix.to_vec(), 0, now));
                (suffix.len(), true)
            }
        }
    }

    /// Value length of a live key, zero otherwise.
    pub(crate) fn strlen(&self, key: &[u8]) -> usize {
        let inner = self.read();
        match inner.items.get(key) {
            Some(entry) if !entry.is_expired_at(now_precise()) => entry.value.len(),
            _ => 0,
        }
    }

    /// Live keys matching a glob pattern.
    pub(crate) fn keys(&self, pattern: &[u8]) -> Vec<Vec<u8>> {
        let inner = self.read();
        inner
            .items
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .filter(|(key, _)| pattern == b"*" || glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Live-only value+TTL copy, used by cross-shard rename.
    pub(crate) fn snapshot_entry(&self, key: &[u8]) -> Option<(Vec<u8>, i64)> {
        let inner = self.read();
        let entry = inner.items.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some((entry.value.clone(), entry.expire_at()))
    }

    /// Invokes `f` for every entry live at `now`.
    pub(crate) fn snapshot_each(&self, now: i64, mut f: impl FnMut(&[u8], &[u8], i64)) {
        let inner = self.read();
        for (key, entry) in &inner.items {
            let expire_at = entry.expire_at();
            if expire_at > 0 && expire_at <= now {
                continue;
            }
            f(key, &entry.value, expire_at);
        }
    }

    /// Pops expired heap roots, bounded per tick to cap lock hold time. Returns removals.
    pub(crate) fn expire_tick(&self, now: i64, max: usize) -> usize {
        let mut inner = self.write();
        let ShardInner { items, heap } = &mut *inner;

        let mut removed = 0_usize;
        while removed < max {
            match heap.peek() {
                Some(slot) if slot.expire_at <= now => {}
                _ => break,
            }
            if let Some(slot) = heap.pop(items) {
                items.remove(&slot.key);
                removed += 1;
            }
        }
        removed
    }

    /// Samples up to `sample` entries and hands idle ones to `sink`; entries the sink accepts
    /// are removed in the same critical section. Returns removals.
    pub(crate) fn sweep_cold(
        &self,
        idle_deadline: i64,
        sample: usize,
        mut sink: impl FnMut(ColdRecord) -> bool,
    ) -> usize {
        let mut inner = self.write();
        let ShardInner { items, heap } = &mut *inner;

        let sampled: Vec<(Vec<u8>, i64)> = items
            .iter()
            .take(sample)
            .map(|(key, entry)| (key.clone(), entry.last_access()))
            .collect();

        let mut moved = 0_usize;
        for (key, access) in sampled {
            if access >= idle_deadline {
                continue;
            }
            let Some(entry) = items.get(&key) else {
                continue;
            };
            let record = ColdRecord {
                key: key.clone(),
                value: entry.value.clone(),
                expire_at: entry.expire_at(),
            };
            // Sink refusal means channel backpressure; the entry stays hot for the next round.
            if sink(record) {
                remove_locked(items, heap, &key);
                moved += 1;
            }
        }
        moved
    }

    /// Returns the least recently used of up to `sample` entries.
    pub(crate) fn sample_min_access(&self, sample: usize) -> Option<(Vec<u8>, i64)> {
        let inner = self.read();
        inner
            .items
            .iter()
            .take(sample)
            .map(|(key, entry)| (key, entry.last_access()))
            .min_by_key(|&(_, access)| access)
            .map(|(key, access)| (key.clone(), access))
    }

    /// Removes a key, returning its value and TTL for cold-tier demotion.
    pub(crate) fn take_for_demotion(&self, key: &[u8]) -> Option<(Vec<u8>, i64)> {
        let mut inner = self.write();
        let ShardInner { items, heap } = &mut *inner;

        let taken = items
            .get(key)
            .map(|entry| (entry.value.clone(), entry.expire_at()))?;
        remove_locked(items, heap, key);
        Some(taken)
    }

    /// Drops every entry.
    pub(crate) fn clear(&self) {
        let mut inner = self.write();
        inner.items.clear();
        inner.heap.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.read().items.len()
    }

    #[cfg(test)]
    pub(crate) fn check_consistency(&self) -> bool {
        let inner = self.read();
        inner.heap.check_consistency(&inner.items)
    }

    #[cfg(test)]
    pub(crate) fn heap_len(&self) -> usize {
        self.read().heap.len()
    }
}

#[cfg(test)]
#[path = "shard/tests.rs"]
mod tests;
