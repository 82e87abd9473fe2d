use super::Shard;
use ember_common::clock::now_precise;
use ember_common::error::EmberError;
use googletest::prelude::*;
use rstest::rstest;

fn far_future() -> i64 {
    now_precise() + 60_000_000_000
}

fn already_past() -> i64 {
    now_precise() - 1_000_000
}

#[rstest]
fn set_then_get_round_trips() {
    let shard = Shard::default();
    assert_that!(shard.set(b"k", b"v1".to_vec(), 0), eq(true));
    assert_that!(shard.set(b"k", b"v2".to_vec(), 0), eq(false));
    assert_that!(shard.get(b"k"), eq(&Some(b"v2".to_vec())));
    assert_that!(shard.get(b"missing"), eq(&None));
}

#[rstest]
fn get_lazily_removes_expired_entries() {
    let shard = Shard::default();
    shard.set(b"gone", b"v".to_vec(), already_past());
    assert_that!(shard.len(), eq(1));
    assert_that!(shard.get(b"gone"), eq(&None));
    assert_that!(shard.len(), eq(0));
    assert_that!(shard.heap_len(), eq(0));
}

#[rstest]
fn del_removes_timed_entries_from_map_and_heap() {
    let shard = Shard::default();
    shard.set(b"a", b"v".to_vec(), far_future());
    shard.set(b"b", b"v".to_vec(), far_future());
    assert_that!(shard.del(b"a"), eq(true));
    assert_that!(shard.del(b"a"), eq(false));
    assert_that!(shard.len(), eq(1));
    assert_that!(shard.heap_len(), eq(1));
    assert_that!(shard.check_consistency(), eq(true));
}

#[rstest]
fn exists_respects_ttl() {
    let shard = Shard::default();
    shard.set(b"live", b"v".to_vec(), far_future());
    shard.set(b"dead", b"v".to_vec(), already_past());
    assert_that!(shard.exists(b"live"), eq(true));
    assert_that!(shard.exists(b"dead"), eq(false));
    assert_that!(shard.exists(b"missing"), eq(false));
}

#[rstest]
fn overwrite_repairs_heap_membership() {
    let shard = Shard::default();

    // Untimed -> timed pushes onto the heap.
    shard.set(b"k", b"v".to_vec(), 0);
    assert_that!(shard.heap_len(), eq(0));
    shard.set(b"k", b"v".to_vec(), far_future());
    assert_that!(shard.heap_len(), eq(1));

    // Timed -> timed re-heapifies in place.
    shard.set(b"k", b"v".to_vec(), far_future() + 1_000);
    assert_that!(shard.heap_len(), eq(1));
    assert_that!(shard.check_consistency(), eq(true));

    // Timed -> untimed removes from the heap.
    shard.set(b"k", b"v".to_vec(), 0);
    assert_that!(shard.heap_len(), eq(0));
    assert_that!(shard.check_consistency(), eq(true));
}

#[rstest]
fn expire_and_persist_update_live_entries_only() {
    let shard = Shard::default();
    shard.set(b"k", b"v".to_vec(), 0);

    assert_that!(shard.expire(b"k", far_future()), eq(true));
    assert_that!(shard.heap_len(), eq(1));

    // Persist is expire-to-zero.
    assert_that!(shard.expire(b"k", 0), eq(true));
    assert_that!(shard.heap_len(), eq(0));

    assert_that!(shard.expire(b"missing", far_future()), eq(false));
    shard.set(b"dead", b"v".to_vec(), already_past());
    assert_that!(shard.expire(b"dead", far_future()), eq(false));
}

#[rstest]
fn ttl_reports_remaining_no_ttl_and_missing() {
    let shard = Shard::default();
    shard.set(b"forever", b"v".to_vec(), 0);
    shard.set(b"timed", b"v".to_vec(), now_precise() + 5_000_000_000);
    shard.set(b"dead", b"v".to_vec(), already_past());

    assert_that!(shard.ttl_nanos(b"forever"), eq(-1));
    assert_that!(shard.ttl_nanos(b"missing"), eq(-2));
    assert_that!(shard.ttl_nanos(b"dead"), eq(-2));
    let remaining = shard.ttl_nanos(b"timed");
    assert_that!(remaining > 0, eq(true));
    assert_that!(remaining <= 5_000_000_000, eq(true));
}

#[rstest]
fn incr_by_accumulates_and_recreates_expired_keys() {
    let shard = Shard::default();
    assert_that!(shard.incr_by(b"n", 7), eq(&Ok((7, true))));
    assert_that!(shard.incr_by(b"n", -2), eq(&Ok((5, false))));
    assert_that!(shard.get(b"n"), eq(&Some(b"5".to_vec())));

    shard.set(b"n", b"99".to_vec(), already_past());
    assert_that!(shard.incr_by(b"n", 3), eq(&Ok((3, true))));
}

#[rstest]
#[case(b"not-a-number".as_slice())]
#[case(b"1.5".as_slice())]
#[case(b"".as_slice())]
fn incr_by_rejects_non_integer_values(#[case] value: &[u8]) {
    let shard = Shard::default();
    shard.set(b"k", value.to_vec(), 0);
    assert_that!(shard.incr_by(b"k", 1), eq(&Err(EmberError::NotAnInteger)));
}

#[rstest]
fn incr_by_rejects_overflow() {
    let shard = Shard::default();
    shard.set(b"k", i64::MAX.to_string().into_bytes(), 0);
    assert_that!(shard.incr_by(b"k", 1), eq(&Err(EmberError::NotAnInteger)));
    // Value is untouched after the failed increment.
    assert_that!(shard.get(b"k"), eq(&Some(i64::MAX.to_string().into_bytes())));
}

#[rstest]
fn append_extends_and_recreates() {
    let shard = Shard::default();
    assert_that!(shard.append_value(b"k", b"hello"), eq((5, true)));
    assert_that!(shard.append_value(b"k", b" world"), eq((11, false)));
    assert_that!(shard.get(b"k"), eq(&Some(b"hello world".to_vec())));

    shard.set(b"k", b"stale".to_vec(), already_past());
    assert_that!(shard.append_value(b"k", b"fresh"), eq((5, true)));
}

#[rstest]
fn strlen_ignores_dead_keys() {
    let shard = Shard::default();
    shard.set(b"live", b"abcde".to_vec(), 0);
    shard.set(b"dead", b"abcde".to_vec(), already_past());
    assert_that!(shard.strlen(b"live"), eq(5));
    assert_that!(shard.strlen(b"dead"), eq(0));
    assert_that!(shard.strlen(b"missing"), eq(0));
}

#[rstest]
fn keys_filters_by_pattern_and_liveness() {
    let shard = Shard::default();
    shard.set(b"user:1", b"v".to_vec(), 0);
    shard.set(b"user:2", b"v".to_vec(), 0);
    shard.set(b"session:1", b"v".to_vec(), 0);
    shard.set(b"user:9", b"v".to_vec(), already_past());

    let mut matched = shard.keys(b"user:*");
    matched.sort_unstable();
    assert_that!(matched, eq(&vec![b"user:1".to_vec(), b"user:2".to_vec()]));
    assert_that!(shard.keys(b"*").len(), eq(3));
}

#[rstest]
fn expire_tick_pops_only_due_entries_within_budget() {
    let shard = Shard::default();
    let now = now_precise();
    for i in 0..10_i64 {
        let key = format!("due:{i}");
        shard.set(key.as_bytes(), b"v".to_vec(), now - 10 + i);
    }
    shard.set(b"later", b"v".to_vec(), now + 60_000_000_000);

    assert_that!(shard.expire_tick(now, 4), eq(4));
    assert_that!(shard.expire_tick(now, 128), eq(6));
    assert_that!(shard.expire_tick(now, 128), eq(0));
    assert_that!(shard.len(), eq(1));
    assert_that!(shard.check_consistency(), eq(true));
}

#[rstest]
fn sweep_cold_moves_idle_entries_and_respects_backpressure() {
    let shard = Shard::default();
    shard.set(b"idle:a", b"v".to_vec(), 0);
    shard.set(b"idle:b", b"v".to_vec(), 0);

    // Deadline far in the future makes every entry idle.
    let deadline = now_precise() + 1;
    let mut accepted = Vec::new();
    let moved = shard.sweep_cold(deadline, 16, |record| {
        accepted.push(record.key.clone());
        true
    });
    assert_that!(moved, eq(2));
    assert_that!(shard.len(), eq(0));

    // A refusing sink leaves entries hot.
    shard.set(b"idle:c", b"v".to_vec(), 0);
    let moved = shard.sweep_cold(deadline, 16, |_| false);
    assert_that!(moved, eq(0));
    assert_that!(shard.len(), eq(1));
}

#[rstest]
fn snapshot_each_skips_dead_entries() {
    let shard = Shard::default();
    shard.set(b"live", b"v1".to_vec(), 0);
    shard.set(b"timed", b"v2".to_vec(), far_future());
    shard.set(b"dead", b"v3".to_vec(), already_past());

    let mut seen = Vec::new();
    shard.snapshot_each(now_precise(), |key, _, _| seen.push(key.to_vec()));
    seen.sort_unstable();
    assert_that!(seen, eq(&vec![b"live".to_vec(), b"timed".to_vec()]));
}

#[rstest]
fn heap_stays_consistent_across_mixed_operations() {
    let shard = Shard::default();
    let base = now_precise() + 60_000_000_000;
    for i in 0..50_i64 {
        let key = format!("k:{i}");
        let expire_at = if i % 3 == 0 { 0 } else { base + i * 7 };
        shard.set(key.as_bytes(), b"v".to_vec(), expire_at);
    }
    for i in (0..50_i64).step_by(5) {
        let key = format!("k:{i}");
        shard.expire(key.as_bytes(), base + 1_000 - i);
    }
    for i in (0..50_i64).step_by(7) {
        let key = format!("k:{i}");
        shard.del(key.as_bytes());
    }
    assert_that!(shard.check_consistency(), eq(true));
}
