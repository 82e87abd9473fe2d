//! Process-wide clock sources.
//!
//! The cached clock trades ~1 s of resolution for a single atomic load on hot paths. It backs
//! last-access stamps and coarse idleness checks; exact TTL decisions always go through
//! [`now_precise`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Once;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

static CACHED_NOW: AtomicI64 = AtomicI64::new(0);
static TICKER: Once = Once::new();

fn wall_clock_nanos() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX)
}

/// Precise wall-clock timestamp in nanoseconds since the Unix epoch.
#[must_use]
pub fn now_precise() -> i64 {
    wall_clock_nanos()
}

/// Cached wall-clock timestamp, refreshed once per second by a background ticker.
///
/// The first call seeds the value synchronously and spawns the refresher, so readers never
/// observe zero.
#[must_use]
pub fn now_cached() -> i64 {
    TICKER.call_once(|| {
        CACHED_NOW.store(wall_clock_nanos(), Ordering::Relaxed);
        let _ = thread::Builder::new()
            .name("ember-clock".to_owned())
            .spawn(|| loop {
                thread::sleep(Duration::from_secs(1));
                CACHED_NOW.store(wall_clock_nanos(), Ordering::Relaxed);
            });
    });
    CACHED_NOW.load(Ordering::Relaxed)
}
