//! Eviction paths: LRU sampling under the key cap, idle-entry demotion to the cold tier, and
//! the worker pool that drains demoted records into the cold store.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;

use ember_common::clock::now_precise;
use ember_common::error::EmberResult;

use crate::cache::Cache;
use crate::cold::{ColdRecord, ColdStore};

/// Entries idle longer than this are demoted to the cold tier.
const COLD_IDLE_NANOS: i64 = 5 * 60 * 1_000_000_000;
/// Entries inspected per shard by one cold-eviction sweep.
const COLD_SAMPLE_PER_SHARD: usize = 16;
/// Entries inspected per shard when choosing an LRU victim.
const LRU_SAMPLE_PER_SHARD: usize = 5;
/// Expired entries removed per shard per TTL tick, bounding lock hold time.
const EXPIRE_BATCH_PER_SHARD: usize = 128;
/// Cold-bound record channel bound; overflow leaves entries hot for the next round.
pub(crate) const COLD_CHANNEL_CAPACITY: usize = 1024;
/// Records accumulated per cold-store batch insert.
const COLD_BATCH_SIZE: usize = 64;
/// Worker threads draining the cold-bound channel.
const COLD_FLUSH_WORKERS: usize = 4;

impl Cache {
    /// Whether a cold store is attached.
    #[must_use]
    pub fn has_cold(&self) -> bool {
        self.cold_store().is_some()
    }

    /// One TTL pass: pops due heap roots on every shard, bounded per shard.
    pub fn expire_by_ttl(&self) {
        let now = now_precise();
        for shard in self.shards() {
            let removed = shard.expire_tick(now, EXPIRE_BATCH_PER_SHARD);
            if removed > 0 {
                self.add_total(-(removed as i64));
            }
        }
    }

    /// One cold-eviction pass: samples each shard and enqueues idle entries for demotion.
    /// A full channel leaves entries hot until the next round.
    pub fn evict_cold(&self) {
        if !self.has_cold() {
            return;
        }
        let Some(sender) = self.cold_sender() else {
            return;
        };

        let idle_deadline = now_precise() - COLD_IDLE_NANOS;
        for shard in self.shards() {
            let moved = shard.sweep_cold(idle_deadline, COLD_SAMPLE_PER_SHARD, |record| {
                sender.try_send(record).is_ok()
            });
            if moved > 0 {
                self.add_total(-(moved as i64));
            }
        }
    }

    /// Flushes the cold-tier index to disk.
    pub fn flush_cold(&self) {
        if let Some(cold) = self.cold_store() {
            if let Err(error) = cold.flush() {
                tracing::error!(%error, "cold flush failed");
            }
        }
    }

    /// Evicts the least recently used of the sampled entries, demoting it to the cold tier
    /// when one is attached. Sampling holds read locks only; the removal write-locks the
    /// victim's shard alone.
    pub(crate) fn evict_lru(&self) {
        let mut victim: Option<(usize, Vec<u8>, i64)> = None;
        for (index, shard) in self.shards().iter().enumerate() {
            if let Some((key, access)) = shard.sample_min_access(LRU_SAMPLE_PER_SHARD) {
                let better = victim
                    .as_ref()
                    .is_none_or(|&(_, _, best_access)| access < best_access);
                if better {
                    victim = Some((index, key, access));
                }
            }
        }

        let Some((index, key, _)) = victim else {
            return;
        };
        if let Some((value, expire_at)) = self.shards()[index].take_for_demotion(&key) {
            self.add_total(-1);
            if let Some(cold) = self.cold_store() {
                cold.put(ColdRecord {
                    key,
                    value,
                    expire_at,
                });
            }
        }
    }
}

/// Starts the cold flush worker pool for an attached store.
pub(crate) fn spawn_flush_workers(cache: &Cache, store: &Arc<ColdStore>) -> EmberResult<()> {
    for worker_id in 0..COLD_FLUSH_WORKERS {
        let receiver = cache.cold_receiver();
        let store = Arc::clone(store);
        let handle = thread::Builder::new()
            .name(format!("ember-cold-{worker_id}"))
            .spawn(move || flush_worker(&receiver, &store))?;
        cache.register_worker(handle);
    }
    Ok(())
}

/// Drains cold-bound records, batching consecutive ones into a single index insert.
fn flush_worker(receiver: &Receiver<ColdRecord>, store: &Arc<ColdStore>) {
    let mut batch = Vec::with_capacity(COLD_BATCH_SIZE);
    while let Ok(record) = receiver.recv() {
        batch.push(record);
        while batch.len() < COLD_BATCH_SIZE {
            match receiver.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }
        store.put_batch(std::mem::take(&mut batch));
    }
}
