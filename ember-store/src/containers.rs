//! Hot-path container aliases.
//!
//! Container choices for shard-local tables are centralized here so future allocator or hash
//! policy changes stay out of the operation modules.

use hashbrown::HashMap as HbMap;

/// Hot-path hash map used by shard maps and the cold-tier index.
pub(crate) type HotMap<K, V> = HbMap<K, V>;
