//! Background scheduler for the three periodic duties: TTL expiry, cold eviction, cold flush.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cache::Cache;

const TTL_INTERVAL: Duration = Duration::from_secs(1);
const COLD_EVICT_INTERVAL: Duration = Duration::from_secs(10);
const COLD_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the scheduler thread. Dropping without [`Janitor::stop`] detaches the thread; it parks
/// on a disconnected channel and exits on its next wakeup.
#[derive(Debug)]
pub struct Janitor {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Janitor {
    /// Starts the scheduler over a shared cache.
    #[must_use]
    pub fn start(cache: Arc<Cache>) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("ember-janitor".to_owned())
            .spawn(move || run(&cache, &stop_rx))
            .ok();
        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Stops the scheduler and joins its thread. In-flight per-shard passes run to completion.
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(cache: &Arc<Cache>, stop_rx: &mpsc::Receiver<()>) {
    let mut next_ttl = Instant::now() + TTL_INTERVAL;
    let mut next_cold_evict = Instant::now() + COLD_EVICT_INTERVAL;
    // Armed lazily once the cache reports a cold store.
    let mut next_cold_flush: Option<Instant> = None;

    loop {
        if next_cold_flush.is_none() && cache.has_cold() {
            next_cold_flush = Some(Instant::now() + COLD_FLUSH_INTERVAL);
        }

        let mut next_due = next_ttl.min(next_cold_evict);
        if let Some(flush_at) = next_cold_flush {
            next_due = next_due.min(flush_at);
        }

        let timeout = next_due.saturating_duration_since(Instant::now());
        match stop_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!("janitor stopping");
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        if now >= next_ttl {
            cache.expire_by_ttl();
            next_ttl = now + TTL_INTERVAL;
        }
        if now >= next_cold_evict {
            cache.evict_cold();
            next_cold_evict = now + COLD_EVICT_INTERVAL;
        }
        if let Some(flush_at) = next_cold_flush {
            if now >= flush_at {
                cache.flush_cold();
                next_cold_flush = Some(now + COLD_FLUSH_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Janitor;
    use crate::cache::Cache;
    use ember_common::persist::NullPersistence;
    use googletest::prelude::*;
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    fn stop_returns_promptly() {
        let cache = Arc::new(Cache::new(Arc::new(NullPersistence)));
        let mut janitor = Janitor::start(Arc::clone(&cache));
        let started = std::time::Instant::now();
        janitor.stop();
        assert_that!(started.elapsed() < std::time::Duration::from_secs(1), eq(true));
    }
}
