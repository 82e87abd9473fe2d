//! Per-shard TTL min-heap with back-pointer repair.
//!
//! The heap owns an array of `(expire_at, key)` slots ordered by `expire_at`; each slot's
//! position is mirrored into the owning entry's `heap_index` so shard operations can remove or
//! re-heapify a specific key in O(log n). Every method takes the shard map so both structures
//! mutate inside the caller's critical section.

use crate::containers::HotMap;
use crate::entry::{Entry, HEAP_NONE};

/// One timed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TtlSlot {
    pub(crate) expire_at: i64,
    pub(crate) key: Vec<u8>,
}

/// Min-heap on `expire_at`. Entries with no TTL are never inserted.
#[derive(Debug, Default)]
pub(crate) struct TtlHeap {
    slots: Vec<TtlSlot>,
}

impl TtlHeap {
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Earliest deadline currently tracked.
    pub(crate) fn peek(&self) -> Option<&TtlSlot> {
        self.slots.first()
    }

    /// Inserts a timed key and records its position in the entry.
    pub(crate) fn push(&mut self, items: &mut HotMap<Vec<u8>, Entry>, key: Vec<u8>, expire_at: i64) {
        let index = self.slots.len();
        self.slots.push(TtlSlot { expire_at, key });
        self.set_back_pointer(items, index);
        self.sift_up(items, index);
    }

    /// Removes and returns the slot with the minimum deadline.
    pub(crate) fn pop(&mut self, items: &mut HotMap<Vec<u8>, Entry>) -> Option<TtlSlot> {
        if self.slots.is_empty() {
            return None;
        }
        Some(self.remove(items, 0))
    }

    /// Removes the slot at `index`, restoring the heap order around it.
    pub(crate) fn remove(&mut self, items: &mut HotMap<Vec<u8>, Entry>, index: usize) -> TtlSlot {
        let last = self.slots.len() - 1;
        self.slots.swap(index, last);
        let removed = self.slots.pop().expect("swap guarantees a tail slot");
        if let Some(entry) = items.get_mut(&removed.key) {
            entry.heap_index = HEAP_NONE;
        }
        if index < self.slots.len() {
            self.set_back_pointer(items, index);
            self.sift_down(items, index);
            self.sift_up(items, index);
        }
        removed
    }

    /// Re-heapifies the slot at `index` after its deadline changed.
    pub(crate) fn repair(
        &mut self,
        items: &mut HotMap<Vec<u8>, Entry>,
        index: usize,
        expire_at: i64,
    ) {
        self.slots[index].expire_at = expire_at;
        self.sift_down(items, index);
        self.sift_up(items, index);
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    fn set_back_pointer(&self, items: &mut HotMap<Vec<u8>, Entry>, index: usize) {
        if let Some(entry) = items.get_mut(&self.slots[index].key) {
            entry.heap_index = index;
        }
    }

    fn sift_up(&mut self, items: &mut HotMap<Vec<u8>, Entry>, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.slots[index].expire_at >= self.slots[parent].expire_at {
                break;
            }
            self.slots.swap(index, parent);
            self.set_back_pointer(items, index);
            self.set_back_pointer(items, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, items: &mut HotMap<Vec<u8>, Entry>, mut index: usize) {
        let len = self.slots.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let mut smallest = left;
            let right = left + 1;
            if right < len && self.slots[right].expire_at < self.slots[left].expire_at {
                smallest = right;
            }
            if self.slots[smallest].expire_at >= self.slots[index].expire_at {
                break;
            }
            self.slots.swap(index, smallest);
            self.set_back_pointer(items, index);
            self.set_back_pointer(items, smallest);
            index = smallest;
        }
    }

    /// Validates the min-heap property and map back-pointers. Test support.
    #[cfg(test)]
    pub(crate) fn check_consistency(&self, items: &HotMap<Vec<u8>, Entry>) -> bool {
        for (index, slot) in self.slots.iter().enumerate() {
            if index > 0 {
                let parent = (index - 1) / 2;
                if self.slots[parent].expire_at > slot.expire_at {
                    return false;
                }
            }
            match items.get(&slot.key) {
                Some(entry) if entry.heap_index == index => {}
                _ => return false,
            }
        }
        items
            .iter()
            .filter(|(_, entry)| entry.heap_index != HEAP_NONE)
            .all(|(_, entry)| entry.heap_index < self.slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::TtlHeap;
    use crate::containers::HotMap;
    use crate::entry::{Entry, HEAP_NONE};
    use googletest::prelude::*;
    use rstest::rstest;

    fn insert(items: &mut HotMap<Vec<u8>, Entry>, heap: &mut TtlHeap, key: &[u8], expire_at: i64) {
        items.insert(key.to_vec(), Entry::new(b"v".to_vec(), expire_at, 1));
        heap.push(items, key.to_vec(), expire_at);
    }

    #[rstest]
    fn pop_returns_deadlines_in_ascending_order() {
        let mut items = HotMap::new();
        let mut heap = TtlHeap::default();
        for (key, expire_at) in [(b"a", 50_i64), (b"b", 10), (b"c", 40), (b"d", 20), (b"e", 30)] {
            insert(&mut items, &mut heap, key, expire_at);
        }
        assert_that!(heap.check_consistency(&items), eq(true));

        let mut order = Vec::new();
        while let Some(slot) = heap.pop(&mut items) {
            items.remove(&slot.key);
            order.push(slot.expire_at);
        }
        assert_that!(order, eq(&vec![10, 20, 30, 40, 50]));
    }

    #[rstest]
    fn remove_from_middle_keeps_back_pointers_consistent() {
        let mut items = HotMap::new();
        let mut heap = TtlHeap::default();
        for (key, expire_at) in [
            (b"k0".as_slice(), 5_i64),
            (b"k1", 15),
            (b"k2", 25),
            (b"k3", 35),
            (b"k4", 45),
            (b"k5", 12),
        ] {
            insert(&mut items, &mut heap, key, expire_at);
        }

        let victim_index = items.get(b"k3".as_slice()).expect("inserted").heap_index;
        let removed = heap.remove(&mut items, victim_index);
        assert_that!(removed.expire_at, eq(35));
        assert_that!(items.get(b"k3".as_slice()).expect("still mapped").heap_index, eq(HEAP_NONE));
        assert_that!(heap.check_consistency(&items), eq(true));
        assert_that!(heap.len(), eq(5));
    }

    #[rstest]
    #[case(1)]
    #[case(90)]
    fn repair_moves_slot_to_its_new_rank(#[case] new_deadline: i64) {
        let mut items = HotMap::new();
        let mut heap = TtlHeap::default();
        for (key, expire_at) in [(b"a".as_slice(), 10_i64), (b"b", 20), (b"c", 30), (b"d", 40)] {
            insert(&mut items, &mut heap, key, expire_at);
        }

        let index = items.get(b"c".as_slice()).expect("inserted").heap_index;
        heap.repair(&mut items, index, new_deadline);
        items
            .get_mut(b"c".as_slice())
            .expect("inserted")
            .expire_at
            .store(new_deadline, std::sync::atomic::Ordering::Relaxed);
        assert_that!(heap.check_consistency(&items), eq(true));

        let mut order = Vec::new();
        while let Some(slot) = heap.pop(&mut items) {
            items.remove(&slot.key);
            order.push(slot.expire_at);
        }
        let mut expected = vec![10, 20, 40, new_deadline];
        expected.sort_unstable();
        assert_that!(order, eq(&expected));
    }
}
