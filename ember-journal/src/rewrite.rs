//! Online journal compaction.
//!
//! The snapshot of the live set streams into a temp file while the background writer keeps
//! appending to the main file, duplicating every new record into the tail buffer. The swap
//! drains the tail into the temp file under the file lock, so no record accepted during the
//! rewrite is lost, then atomically renames the temp file over the journal.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::sync::atomic::Ordering;
use std::sync::PoisonError;

use tracing::info;

use ember_common::error::EmberResult;

use crate::record::build_record;
use crate::writer::{Aof, AofFile, JOURNAL_FILE, WRITE_BUF_SIZE};

const REWRITE_FILE: &str = "journal.aof.rewrite";

impl Aof {
    /// Rewrites the journal to exactly the live set produced by `snapshot`, plus any records
    /// written concurrently. `snapshot` receives an emit callback and must call it once per
    /// live `(key, value, expire_at)`.
    ///
    /// # Errors
    ///
    /// On any failure before the rename the temp file is removed and the previous journal is
    /// left untouched.
    pub fn rewrite(
        &self,
        snapshot: impl FnOnce(&mut dyn FnMut(&[u8], &[u8], i64)),
    ) -> EmberResult<()> {
        let tmp_path = self.dir.join(REWRITE_FILE);
        let journal_path = self.dir.join(JOURNAL_FILE);

        {
            let mut tail = self
                .rewrite_state
                .tail
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            tail.clear();
        }
        self.rewrite_state.active.store(true, Ordering::Release);

        let result = (|| -> EmberResult<(usize, usize)> {
            let mut tmp_writer = BufWriter::with_capacity(WRITE_BUF_SIZE, File::create(&tmp_path)?);

            let mut snapshot_error: Option<std::io::Error> = None;
            let mut snapshot_count = 0_usize;
            snapshot(&mut |key, value, expire_at| {
                if snapshot_error.is_some() {
                    return;
                }
                let record = build_record("SET", key, value, expire_at);
                match tmp_writer.write_all(&record) {
                    Ok(()) => snapshot_count += 1,
                    Err(error) => snapshot_error = Some(error),
                }
            });
            if let Some(error) = snapshot_error {
                return Err(error.into());
            }

            // Swap phase: the file lock stalls the background writer, so nothing lands in the
            // old file after the tail drain.
            let mut guard = self.lock_file();
            let buffered = {
                let mut tail = self
                    .rewrite_state
                    .tail
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let drained: Vec<Vec<u8>> = tail.drain(..).collect();
                self.rewrite_state.active.store(false, Ordering::Release);
                drained
            };
            let buffered_count = buffered.len();
            for record in buffered {
                tmp_writer.write_all(&record)?;
            }
            tmp_writer.flush()?;
            tmp_writer.get_ref().sync_all()?;

            guard.writer.flush()?;
            guard.writer.get_ref().sync_all()?;

            fs::rename(&tmp_path, &journal_path)?;
            *guard = AofFile::open(&self.dir)?;
            Ok((snapshot_count, buffered_count))
        })();

        match result {
            Ok((snapshot_count, buffered_count)) => {
                info!(
                    entries = snapshot_count + buffered_count,
                    buffered = buffered_count,
                    "journal rewrite complete"
                );
                Ok(())
            }
            Err(error) => {
                self.rewrite_state.active.store(false, Ordering::Release);
                let _ = fs::remove_file(&tmp_path);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::writer::{Aof, JOURNAL_FILE};
    use googletest::prelude::*;
    use rstest::rstest;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn replay_state(aof: &Aof) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let mut state = BTreeMap::new();
        aof.read(|cmd, key, value, _| match cmd {
            b"SET" => {
                state.insert(key.to_vec(), value.to_vec());
            }
            b"DEL" => {
                state.remove(key);
            }
            _ => {}
        })
        .expect("read");
        state
    }

    #[rstest]
    fn rewrite_compacts_to_the_live_set() {
        let dir = TempDir::new().expect("tempdir");
        let aof = Aof::open(dir.path()).expect("open");

        // 1000 writes, the first 500 overwritten, the last 200 deleted.
        for i in 0..1000_u32 {
            let key = format!("rw:{i}");
            let value = format!("v1:{i}");
            aof.append("SET", key.as_bytes(), value.as_bytes(), 0);
        }
        for i in 0..500_u32 {
            let key = format!("rw:{i}");
            let value = format!("v2:{i}");
            aof.append("SET", key.as_bytes(), value.as_bytes(), 0);
        }
        for i in 800..1000_u32 {
            let key = format!("rw:{i}");
            aof.append("DEL", key.as_bytes(), b"", 0);
        }
        aof.flush_sync();

        let live = replay_state(&aof);
        assert_that!(live.len(), eq(800));
        let before = std::fs::metadata(dir.path().join(JOURNAL_FILE))
            .expect("metadata")
            .len();

        aof.rewrite(|emit| {
            for (key, value) in &live {
                emit(key, value, 0);
            }
        })
        .expect("rewrite");

        let after = std::fs::metadata(dir.path().join(JOURNAL_FILE))
            .expect("metadata")
            .len();
        assert_that!((after as f64) < (before as f64) * 0.7, eq(true));

        let replayed = replay_state(&aof);
        assert_that!(replayed.len(), eq(800));
        assert_that!(
            replayed.get(b"rw:42".as_slice()),
            eq(Some(&b"v2:42".to_vec()))
        );
        assert_that!(
            replayed.get(b"rw:700".as_slice()),
            eq(Some(&b"v1:700".to_vec()))
        );
        assert_that!(replayed.contains_key(b"rw:900".as_slice()), eq(false));
        aof.close();
    }

    #[rstest]
    fn writes_racing_the_snapshot_survive_via_the_tail_buffer() {
        let dir = TempDir::new().expect("tempdir");
        let aof = Aof::open(dir.path()).expect("open");
        aof.append("SET", b"stable", b"v", 0);

        aof.rewrite(|emit| {
            // A client write lands while the snapshot is being emitted; the flush barrier
            // guarantees the background writer has routed it through the tail buffer.
            aof.append("SET", b"raced", b"during-rewrite", 0);
            aof.flush_sync();
            emit(b"stable", b"v", 0);
        })
        .expect("rewrite");

        let replayed = replay_state(&aof);
        aof.close();
        assert_that!(replayed.len(), eq(2));
        assert_that!(
            replayed.get(b"raced".as_slice()),
            eq(Some(&b"during-rewrite".to_vec()))
        );
    }

    #[rstest]
    fn rewrite_leaves_no_temp_file_behind() {
        let dir = TempDir::new().expect("tempdir");
        let aof = Aof::open(dir.path()).expect("open");
        aof.append("SET", b"k", b"v", 0);
        aof.rewrite(|emit| emit(b"k", b"v", 0)).expect("rewrite");
        aof.close();

        assert_that!(dir.path().join("journal.aof.rewrite").exists(), eq(false));
        assert_that!(dir.path().join(JOURNAL_FILE).exists(), eq(true));
    }
}
