//! Append-only journal (AOF) for the cache: checksummed text records, a buffered
//! single-writer with a periodic fsync tick, truncate-on-corruption recovery, and an online
//! rewrite that compacts the log without dropping concurrent writes.
//!
//! Record format, one per line:
//!
//! ```text
//! <crc64_hex>|<cmd>|<key>|<expire_at_or_0>|<value>\n
//! ```
//!
//! The checksum covers `<cmd>` through `<value>`. Keys and values may embed `|` (payload
//! splitting is capped at four fields) but never `\n`.

mod persister;
mod read;
mod record;
mod rewrite;
mod writer;

pub use persister::AofPersister;
pub use read::RecoveryReport;
pub use writer::Aof;
