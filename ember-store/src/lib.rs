//! Sharded in-memory storage engine with TTL tracking, LRU eviction, and a disk-backed
//! cold tier.
//!
//! The hot tier is a fixed array of independently locked shards ([`shard`]); the [`cache`]
//! module fronts them, bridges the cold tier, and forwards durable mutations to the journal
//! through the [`ember_common::persist::Persistence`] seam. The [`janitor`] drives the three
//! periodic duties (TTL expiry, cold eviction, cold flush).

pub mod cache;
pub mod cold;
mod containers;
mod entry;
mod eviction;
pub mod glob;
pub mod janitor;
mod shard;
mod ttl_heap;

pub use cache::{Cache, SHARD_COUNT};
pub use cold::{ColdRecord, ColdStore};
pub use janitor::Janitor;
