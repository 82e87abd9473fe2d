//! Disk-backed cold tier for idle entries.
//!
//! The whole index lives in memory under one reader/writer lock and is mirrored to a single
//! snapshot file on flush. The snapshot is written to a temp file and atomically renamed, so a
//! crash leaves either the previous snapshot or the new one. Loading is best-effort: a missing
//! or undecodable snapshot starts the store empty.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ember_common::error::EmberResult;

use crate::containers::HotMap;

const SNAPSHOT_FILE: &str = "cold.bin";
const SNAPSHOT_TMP: &str = "cold.bin.tmp";

/// One record demoted out of the hot tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Absolute expiry in nanoseconds, zero for no TTL.
    pub expire_at: i64,
}

/// Cold-tier store: in-memory index, periodically snapshotted to disk.
#[derive(Debug)]
pub struct ColdStore {
    dir: PathBuf,
    index: RwLock<HotMap<Vec<u8>, ColdRecord>>,
}

impl ColdStore {
    /// Opens (or creates) the cold store under `<dir>/cold`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the directory cannot be created; an unreadable snapshot is
    /// logged and ignored.
    pub fn open(dir: &Path) -> EmberResult<Self> {
        let dir = dir.join("cold");
        fs::create_dir_all(&dir)?;

        let store = Self {
            dir,
            index: RwLock::new(HotMap::new()),
        };
        store.load();
        Ok(store)
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Inserts one record.
    pub fn put(&self, record: ColdRecord) {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index.insert(record.key.clone(), record);
    }

    /// Inserts a batch under one lock acquisition.
    pub fn put_batch(&self, records: Vec<ColdRecord>) {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            index.insert(record.key.clone(), record);
        }
    }

    /// Looks a key up, returning its value and expiry.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<(Vec<u8>, i64)> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        index
            .get(key)
            .map(|record| (record.value.clone(), record.expire_at))
    }

    /// Removes a key from the index.
    pub fn delete(&self, key: &[u8]) {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index.remove(key);
    }

    /// Number of indexed records.
    #[must_use]
    pub fn len(&self) -> usize {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes the whole index to the snapshot file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error when the temp file cannot be written, synced, or renamed; the previous
    /// snapshot stays intact in that case.
    pub fn flush(&self) -> EmberResult<()> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        let records: Vec<&ColdRecord> = index.values().collect();

        let tmp_path = self.dir.join(SNAPSHOT_TMP);
        let result = (|| -> EmberResult<()> {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, &records)
                .map_err(|error| std::io::Error::other(error.to_string()))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();

        if let Err(error) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(error);
        }

        fs::rename(&tmp_path, self.snapshot_path())?;
        debug!(records = records.len(), "cold snapshot flushed");
        Ok(())
    }

    /// Drops every record and unlinks the snapshot file.
    pub fn clear_all(&self) {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index.clear();
        drop(index);
        let _ = fs::remove_file(self.snapshot_path());
    }

    fn load(&self) {
        let file = match File::open(self.snapshot_path()) {
            Ok(file) => file,
            Err(_) => return,
        };
        let records: Vec<ColdRecord> = match bincode::deserialize_from(BufReader::new(file)) {
            Ok(records) => records,
            Err(error) => {
                warn!(%error, "cold snapshot unreadable, starting empty");
                return;
            }
        };

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            index.insert(record.key.clone(), record);
        }
    }
}
