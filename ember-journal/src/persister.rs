//! Adapter presenting the journal as the storage engine's persistence seam.

use std::path::Path;

use ember_common::error::EmberResult;
use ember_common::persist::{JournalOp, Persistence};

use crate::read::RecoveryReport;
use crate::writer::Aof;

/// [`Persistence`] implementation over an append-only journal.
#[derive(Debug)]
pub struct AofPersister {
    aof: Aof,
}

impl AofPersister {
    /// Opens the journal under `dir`.
    ///
    /// # Errors
    ///
    /// Fails when the journal file cannot be opened or the writer cannot start.
    pub fn open(dir: &Path) -> EmberResult<Self> {
        Ok(Self {
            aof: Aof::open(dir)?,
        })
    }

    /// Replays the journal through `handler` with checksum verification and
    /// truncate-on-corruption recovery.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the scan or the truncation.
    pub fn read(
        &self,
        handler: impl FnMut(&[u8], &[u8], &[u8], i64),
    ) -> EmberResult<RecoveryReport> {
        self.aof.read(handler)
    }

    /// Compacts the journal to the live set produced by `snapshot`.
    ///
    /// # Errors
    ///
    /// See [`Aof::rewrite`].
    pub fn rewrite(
        &self,
        snapshot: impl FnOnce(&mut dyn FnMut(&[u8], &[u8], i64)),
    ) -> EmberResult<()> {
        self.aof.rewrite(snapshot)
    }

    /// Blocks until all enqueued records are durable.
    pub fn flush_sync(&self) {
        self.aof.flush_sync();
    }

    /// Stops the background writer after a final flush+fsync.
    pub fn close(&self) {
        self.aof.close();
    }
}

impl Persistence for AofPersister {
    fn append(&self, op: JournalOp, key: &[u8], value: &[u8], expire_at: i64) {
        self.aof.append(op.as_str(), key, value, expire_at);
    }
}

#[cfg(test)]
mod tests {
    use super::AofPersister;
    use ember_common::persist::{JournalOp, Persistence};
    use googletest::prelude::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    fn persister_round_trips_through_the_seam() {
        let dir = TempDir::new().expect("tempdir");
        {
            let persister = AofPersister::open(dir.path()).expect("open");
            persister.append(JournalOp::Set, b"k", b"v", 99);
            persister.append(JournalOp::Del, b"k", b"", 0);
            persister.close();
        }

        let persister = AofPersister::open(dir.path()).expect("reopen");
        let mut replayed = Vec::new();
        let report = persister
            .read(|cmd, key, value, expire_at| {
                replayed.push((cmd.to_vec(), key.to_vec(), value.to_vec(), expire_at));
            })
            .expect("read");
        persister.close();

        assert_that!(report.valid_entries, eq(2));
        assert_that!(
            replayed,
            eq(&vec![
                (b"SET".to_vec(), b"k".to_vec(), b"v".to_vec(), 99_i64),
                (b"DEL".to_vec(), b"k".to_vec(), b"".to_vec(), 0_i64),
            ])
        );
    }
}
