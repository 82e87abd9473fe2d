//! Sharded cache front: key routing, the total-key counter, the cold-tier bridge, and
//! journaling of every durable mutation.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::error;

use ember_common::clock::now_precise;
use ember_common::error::{EmberError, EmberResult};
use ember_common::persist::{JournalOp, Persistence};

use crate::cold::{ColdRecord, ColdStore};
use crate::eviction::COLD_CHANNEL_CAPACITY;
use crate::shard::Shard;

/// Number of hot-tier shards. Power of two so the shard index is a mask of the key hash.
pub const SHARD_COUNT: usize = 64;

fn fnv1a_32(key: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    key.iter()
        .fold(OFFSET_BASIS, |hash, &byte| {
            (hash ^ u32::from(byte)).wrapping_mul(PRIME)
        })
}

/// Sharded in-memory store with optional cold tier and max-key LRU cap.
pub struct Cache {
    shards: Vec<Shard>,
    persister: Arc<dyn Persistence>,
    cold: OnceLock<Arc<ColdStore>>,
    cold_tx: Mutex<Option<Sender<ColdRecord>>>,
    cold_rx: Receiver<ColdRecord>,
    cold_workers: Mutex<Vec<JoinHandle<()>>>,
    max_keys: i64,
    total_keys: AtomicI64,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("shard_count", &self.shards.len())
            .field("total_keys", &self.total_keys.load(Ordering::Relaxed))
            .field("max_keys", &self.max_keys)
            .field("has_cold", &self.cold.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Builds a cache without a key cap.
    #[must_use]
    pub fn new(persister: Arc<dyn Persistence>) -> Self {
        Self::with_max_keys(persister, 0)
    }

    /// Builds a cache that LRU-evicts once the live key count reaches `max_keys`
    /// (zero disables the cap).
    #[must_use]
    pub fn with_max_keys(persister: Arc<dyn Persistence>, max_keys: i64) -> Self {
        let (cold_tx, cold_rx) = crossbeam_channel::bounded(COLD_CHANNEL_CAPACITY);
        Self {
            shards: (0..SHARD_COUNT).map(|_| Shard::default()).collect(),
            persister,
            cold: OnceLock::new(),
            cold_tx: Mutex::new(Some(cold_tx)),
            cold_rx,
            cold_workers: Mutex::new(Vec::new()),
            max_keys,
            total_keys: AtomicI64::new(0),
        }
    }

    /// Attaches a cold store under `dir` and starts its flush worker pool.
    ///
    /// # Errors
    ///
    /// Fails when the cold directory cannot be created, a worker thread cannot be spawned, or
    /// a cold store is already attached.
    pub fn init_cold_storage(&self, dir: &Path) -> EmberResult<()> {
        let store = Arc::new(ColdStore::open(dir)?);
        self.cold
            .set(Arc::clone(&store))
            .map_err(|_| EmberError::InvalidConfig("cold storage already initialized"))?;
        crate::eviction::spawn_flush_workers(self, &store)?;
        Ok(())
    }

    pub(crate) fn shard_for(&self, key: &[u8]) -> &Shard {
        &self.shards[fnv1a_32(key) as usize & (SHARD_COUNT - 1)]
    }

    pub(crate) fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub(crate) fn cold_store(&self) -> Option<&Arc<ColdStore>> {
        self.cold.get()
    }

    pub(crate) fn cold_receiver(&self) -> Receiver<ColdRecord> {
        self.cold_rx.clone()
    }

    pub(crate) fn cold_sender(&self) -> Option<Sender<ColdRecord>> {
        self.cold_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn register_worker(&self, handle: JoinHandle<()>) {
        self.cold_workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    pub(crate) fn add_total(&self, delta: i64) {
        self.total_keys.fetch_add(delta, Ordering::Relaxed);
    }

    /// Writes a value with an optional TTL in nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns [`EmberError::KeyExists`] when `nx` is set and a live entry holds the key.
    pub fn set(&self, key: &[u8], value: Vec<u8>, ttl_nanos: i64, nx: bool) -> EmberResult<()> {
        let expire_at = if ttl_nanos > 0 {
            now_precise().saturating_add(ttl_nanos)
        } else {
            0
        };
        let shard = self.shard_for(key);

        if nx && shard.exists(key) {
            return Err(EmberError::KeyExists);
        }

        if self.max_keys > 0
            && !shard.exists(key)
            && self.total_keys.load(Ordering::Relaxed) >= self.max_keys
        {
            self.evict_lru();
        }

        let is_new = shard.set(key, value.clone(), expire_at);
        if is_new {
            self.add_total(1);
        }

        if let Some(cold) = self.cold.get() {
            cold.delete(key);
        }

        self.persister.append(JournalOp::Set, key, &value, expire_at);
        Ok(())
    }

    /// Reads a value, falling back to the cold tier and promoting hits back into the hot tier.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let shard = self.shard_for(key);
        if let Some(value) = shard.get(key) {
            return Some(value);
        }

        let cold = self.cold.get()?;
        let (value, expire_at) = cold.get(key)?;
        if shard.set(key, value.clone(), expire_at) {
            self.add_total(1);
        }
        cold.delete(key);
        // The cold tier is only durable up to its last flush; re-journal the promoted entry so
        // the AOF stays authoritative.
        self.persister.append(JournalOp::Set, key, &value, expire_at);
        Some(value)
    }

    /// Removes a key from both tiers.
    pub fn delete(&self, key: &[u8]) {
        if self.shard_for(key).del(key) {
            self.add_total(-1);
        }
        if let Some(cold) = self.cold.get() {
            cold.delete(key);
        }
        self.persister.append(JournalOp::Del, key, b"", 0);
    }

    /// Live-key presence across both tiers (no promotion).
    #[must_use]
    pub fn exists(&self, key: &[u8]) -> bool {
        if self.shard_for(key).exists(key) {
            return true;
        }
        self.cold
            .get()
            .is_some_and(|cold| cold.get(key).is_some())
    }

    /// Sets the TTL of a live key to `ttl_nanos` from now. Returns whether the key was live.
    /// A non-positive TTL leaves the key immediately expired.
    pub fn expire(&self, key: &[u8], ttl_nanos: i64) -> bool {
        let expire_at = now_precise().saturating_add(ttl_nanos).max(1);
        self.shard_for(key).expire(key, expire_at)
    }

    /// Clears the TTL of a live key.
    pub fn persist(&self, key: &[u8]) -> bool {
        self.shard_for(key).expire(key, 0)
    }

    /// Remaining lifetime in whole seconds (`-1` no TTL, `-2` missing).
    #[must_use]
    pub fn ttl_secs(&self, key: &[u8]) -> i64 {
        match self.shard_for(key).ttl_nanos(key) {
            sentinel @ (-1 | -2) => sentinel,
            nanos => nanos / 1_000_000_000,
        }
    }

    /// Remaining lifetime in whole milliseconds (`-1` no TTL, `-2` missing).
    #[must_use]
    pub fn ttl_millis(&self, key: &[u8]) -> i64 {
        match self.shard_for(key).ttl_nanos(key) {
            sentinel @ (-1 | -2) => sentinel,
            nanos => nanos / 1_000_000,
        }
    }

    /// Adds `delta` to an integer value. The result is journaled as a full SET.
    ///
    /// # Errors
    ///
    /// Returns [`EmberError::NotAnInteger`] for non-integer values and overflow.
    pub fn incr_by(&self, key: &[u8], delta: i64) -> EmberResult<i64> {
        let (value, is_new) = self.shard_for(key).incr_by(key, delta)?;
        if is_new {
            self.add_total(1);
        }
        self.persister
            .append(JournalOp::Set, key, value.to_string().as_bytes(), 0);
        Ok(value)
    }

    /// Appends to a value and journals the merged result as a full SET.
    pub fn append(&self, key: &[u8], suffix: &[u8]) -> usize {
        let shard = self.shard_for(key);
        let (length, is_new) = shard.append_value(key, suffix);
        if is_new {
            self.add_total(1);
            self.persister.append(JournalOp::Set, key, suffix, 0);
        } else if let Some(value) = shard.get(key) {
            // Re-read outside the shard lock; a concurrent writer may interleave, which is fine
            // for a replay-ordered log.
            self.persister.append(JournalOp::Set, key, &value, 0);
        }
        length
    }

    /// Value length of a live key.
    #[must_use]
    pub fn strlen(&self, key: &[u8]) -> usize {
        self.shard_for(key).strlen(key)
    }

    /// Batch read through the regular (cold-promoting) read path.
    #[must_use]
    pub fn mget(&self, keys: &[Vec<u8>]) -> Vec<Option<Vec<u8>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Batch write of key/value pairs without TTL.
    pub fn mset(&self, pairs: &[(Vec<u8>, Vec<u8>)]) {
        for (key, value) in pairs {
            let _ = self.set(key, value.clone(), 0, false);
        }
    }

    /// Live keys matching a glob pattern, across every shard.
    #[must_use]
    pub fn keys(&self, pattern: &[u8]) -> Vec<Vec<u8>> {
        let mut result = Vec::new();
        for shard in &self.shards {
            result.extend(shard.keys(pattern));
        }
        result
    }

    /// Moves a key, preserving its TTL. Cross-shard moves are read-delete-write: concurrent
    /// observers may momentarily see neither name.
    pub fn rename(&self, old_key: &[u8], new_key: &[u8]) -> bool {
        let src = self.shard_for(old_key);
        let Some((value, expire_at)) = src.snapshot_entry(old_key) else {
            return false;
        };

        if src.del(old_key) {
            self.add_total(-1);
        }
        let dst = self.shard_for(new_key);
        if dst.set(new_key, value.clone(), expire_at) {
            self.add_total(1);
        }

        self.persister.append(JournalOp::Del, old_key, b"", 0);
        self.persister
            .append(JournalOp::Set, new_key, &value, expire_at);
        true
    }

    /// Value type of a live hot-tier key: `string` or `none`.
    #[must_use]
    pub fn key_type(&self, key: &[u8]) -> &'static str {
        if self.shard_for(key).exists(key) {
            "string"
        } else {
            "none"
        }
    }

    /// Drops every entry in both tiers.
    pub fn flush_db(&self) {
        for shard in &self.shards {
            shard.clear();
        }
        self.total_keys.store(0, Ordering::Relaxed);
        if let Some(cold) = self.cold.get() {
            cold.clear_all();
        }
    }

    /// Current hot-tier key count.
    #[must_use]
    pub fn count_keys(&self) -> i64 {
        self.total_keys.load(Ordering::Relaxed)
    }

    /// Invokes `f(key, value, expire_at)` for every live entry, shard by shard under read
    /// locks. Drives the journal rewrite.
    pub fn snapshot(&self, mut f: impl FnMut(&[u8], &[u8], i64)) {
        let now = now_precise();
        for shard in &self.shards {
            shard.snapshot_each(now, &mut f);
        }
    }

    /// Applies one replayed `SET` record without re-journaling it. Recovery runs while the
    /// journal file is locked, so this path must never feed the journal channel.
    pub fn apply_journal_set(&self, key: &[u8], value: Vec<u8>, expire_at: i64) {
        if self.shard_for(key).set(key, value, expire_at) {
            self.add_total(1);
        }
        if let Some(cold) = self.cold.get() {
            cold.delete(key);
        }
    }

    /// Applies one replayed `DEL` record without re-journaling it.
    pub fn apply_journal_del(&self, key: &[u8]) {
        if self.shard_for(key).del(key) {
            self.add_total(-1);
        }
        if let Some(cold) = self.cold.get() {
            cold.delete(key);
        }
    }

    /// Stops the flush worker pool and flushes the cold tier to disk.
    pub fn close(&self) {
        let sender = self
            .cold_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let workers: Vec<JoinHandle<()>> = self
            .cold_workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            let _ = worker.join();
        }

        if let Some(cold) = self.cold.get() {
            if let Err(error) = cold.flush() {
                error!(%error, "cold flush on close failed");
            }
        }
    }
}
