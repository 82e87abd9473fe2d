//! Journal file ownership and the buffered single-writer task.
//!
//! Producers frame records and hand them to a bounded channel; exactly one background thread
//! consumes it, writing through a 64 KiB buffer and syncing on a one-second tick. Producers
//! never perform I/O.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error};

use ember_common::error::EmberResult;

use crate::record::build_record;

pub(crate) const JOURNAL_FILE: &str = "journal.aof";
pub(crate) const WRITE_BUF_SIZE: usize = 64 * 1024;
const CHANNEL_CAPACITY: usize = 4096;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) enum WriterCommand {
    Record(Vec<u8>),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// The journal file plus its user-space buffer. Guarded by one mutex taken by the writer
/// thread, the fsync tick, recovery, and the rewrite swap.
pub(crate) struct AofFile {
    pub(crate) writer: BufWriter<File>,
}

impl AofFile {
    pub(crate) fn open(dir: &Path) -> EmberResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(dir.join(JOURNAL_FILE))?;
        Ok(Self {
            writer: BufWriter::with_capacity(WRITE_BUF_SIZE, file),
        })
    }

    pub(crate) fn flush_and_sync(&mut self) {
        if let Err(err) = self.writer.flush() {
            error!(%err, "journal buffer flush failed");
        }
        if let Err(err) = self.writer.get_ref().sync_all() {
            error!(%err, "journal fsync failed");
        }
    }
}

/// Rewrite coordination: while `active`, the writer duplicates every record into `tail` so the
/// rewrite can replay writes that raced with the snapshot.
pub(crate) struct RewriteState {
    pub(crate) active: AtomicBool,
    pub(crate) tail: Mutex<Vec<Vec<u8>>>,
}

/// Append-only journal handle.
pub struct Aof {
    pub(crate) dir: PathBuf,
    pub(crate) file: Arc<Mutex<AofFile>>,
    pub(crate) rewrite_state: Arc<RewriteState>,
    sender: SyncSender<WriterCommand>,
    writer_thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Aof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aof").field("dir", &self.dir).finish_non_exhaustive()
    }
}

impl Aof {
    /// Opens (or creates) `journal.aof` under `dir` and starts the background writer.
    ///
    /// # Errors
    ///
    /// Fails when the directory or file cannot be created or the writer thread cannot spawn.
    pub fn open(dir: &Path) -> EmberResult<Self> {
        std::fs::create_dir_all(dir)?;
        let file = Arc::new(Mutex::new(AofFile::open(dir)?));
        let rewrite_state = Arc::new(RewriteState {
            active: AtomicBool::new(false),
            tail: Mutex::new(Vec::new()),
        });

        let (sender, receiver) = mpsc::sync_channel::<WriterCommand>(CHANNEL_CAPACITY);
        let file_for_writer = Arc::clone(&file);
        let rewrite_for_writer = Arc::clone(&rewrite_state);
        let writer_thread = thread::Builder::new()
            .name("ember-journal-writer".to_owned())
            .spawn(move || writer_loop(&receiver, &file_for_writer, &rewrite_for_writer))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            file,
            rewrite_state,
            sender,
            writer_thread: Mutex::new(Some(writer_thread)),
        })
    }

    /// Frames and enqueues one record. Blocks only when the channel is full; returns as soon
    /// as the record is queued. After [`Aof::close`] the record is silently dropped.
    pub fn append(&self, cmd: &str, key: &[u8], value: &[u8], expire_at: i64) {
        let record = build_record(cmd, key, value, expire_at);
        if self.sender.send(WriterCommand::Record(record)).is_err() {
            debug!("journal append after shutdown dropped");
        }
    }

    /// Blocks until every record enqueued so far is flushed and fsynced.
    pub fn flush_sync(&self) {
        let (ack_tx, ack_rx) = mpsc::channel::<()>();
        if self.sender.send(WriterCommand::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.recv_timeout(Duration::from_secs(5));
    }

    /// Drains the channel, performs a final flush+fsync, and joins the writer thread.
    pub fn close(&self) {
        let _ = self.sender.send(WriterCommand::Shutdown);
        let handle = self
            .writer_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub(crate) fn lock_file(&self) -> MutexGuard<'_, AofFile> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn writer_loop(
    receiver: &Receiver<WriterCommand>,
    file: &Arc<Mutex<AofFile>>,
    rewrite: &Arc<RewriteState>,
) {
    let mut next_sync = Instant::now() + FLUSH_INTERVAL;
    loop {
        let timeout = next_sync.saturating_duration_since(Instant::now());
        let first = match receiver.recv_timeout(timeout) {
            Ok(command) => Some(command),
            Err(RecvTimeoutError::Timeout) => {
                let mut guard = file.lock().unwrap_or_else(PoisonError::into_inner);
                guard.flush_and_sync();
                next_sync = Instant::now() + FLUSH_INTERVAL;
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => None,
        };

        let mut guard = file.lock().unwrap_or_else(PoisonError::into_inner);
        let mut flush_waiters: Vec<mpsc::Sender<()>> = Vec::new();
        let mut shutdown = first.is_none();
        if let Some(command) = first {
            apply_command(command, &mut guard, rewrite, &mut flush_waiters, &mut shutdown);
        }
        // Drain whatever queued up while we held the lock.
        loop {
            match receiver.try_recv() {
                Ok(command) => {
                    apply_command(command, &mut guard, rewrite, &mut flush_waiters, &mut shutdown);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    shutdown = true;
                    break;
                }
            }
        }

        if !flush_waiters.is_empty() || shutdown {
            guard.flush_and_sync();
            next_sync = Instant::now() + FLUSH_INTERVAL;
        }
        for waiter in flush_waiters {
            let _ = waiter.send(());
        }
        if shutdown {
            return;
        }
    }
}

fn apply_command(
    command: WriterCommand,
    guard: &mut AofFile,
    rewrite: &RewriteState,
    flush_waiters: &mut Vec<mpsc::Sender<()>>,
    shutdown: &mut bool,
) {
    match command {
        WriterCommand::Record(record) => write_record(guard, rewrite, &record),
        WriterCommand::Flush(waiter) => flush_waiters.push(waiter),
        WriterCommand::Shutdown => *shutdown = true,
    }
}

fn write_record(guard: &mut AofFile, rewrite: &RewriteState, record: &[u8]) {
    if let Err(err) = guard.writer.write_all(record) {
        error!(%err, "journal write failed");
        return;
    }
    if rewrite.active.load(std::sync::atomic::Ordering::Acquire) {
        rewrite
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.to_vec());
    }
}
