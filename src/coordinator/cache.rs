//! Bounded FIFO content cache
//!
//! Slots live in an arena and are threaded into a doubly linked list ordered
//! by insertion, with an id → slot map for lookups. Insert, lookup, removal
//! and eviction are all O(1). Reads never reorder entries, and re-inserting
//! a cached id overwrites its bytes in place without moving it.

use crate::common::ContentId;
use bytes::Bytes;
use std::collections::HashMap;

struct Slot {
    id: ContentId,
    data: Bytes,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct FifoCache {
    capacity: usize,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<ContentId, usize>,
    /// oldest entry
    head: Option<usize>,
    /// newest entry
    tail: Option<usize>,
}

impl FifoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn get(&self, id: &ContentId) -> Option<Bytes> {
        let slot = *self.index.get(id)?;
        self.slots[slot].as_ref().map(|s| s.data.clone())
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.index.contains_key(id)
    }

    /// Insert or overwrite `id`. Returns the id evicted to make room, if any.
    pub fn put(&mut self, id: ContentId, data: Bytes) -> Option<ContentId> {
        if self.capacity == 0 {
            return None;
        }

        if let Some(&slot) = self.index.get(&id) {
            if let Some(entry) = self.slots[slot].as_mut() {
                entry.data = data;
            }
            return None;
        }

        let evicted = self.evict_if_full();

        let entry = Slot {
            id: id.clone(),
            data,
            prev: self.tail,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => {
                if let Some(t) = self.slots[tail].as_mut() {
                    t.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.index.insert(id, slot);

        evicted
    }

    /// Drop the oldest entry when the cache is at capacity
    pub fn evict_if_full(&mut self) -> Option<ContentId> {
        if self.capacity == 0 || self.index.len() < self.capacity {
            return None;
        }
        let head = self.head?;
        self.unlink(head).map(|slot| slot.id)
    }

    pub fn remove(&mut self, id: &ContentId) -> Option<Bytes> {
        let slot = *self.index.get(id)?;
        self.unlink(slot).map(|slot| slot.data)
    }

    fn unlink(&mut self, slot: usize) -> Option<Slot> {
        let entry = self.slots[slot].take()?;

        match entry.prev {
            Some(prev) => {
                if let Some(p) = self.slots[prev].as_mut() {
                    p.next = entry.next;
                }
            }
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => {
                if let Some(n) = self.slots[next].as_mut() {
                    n.prev = entry.prev;
                }
            }
            None => self.tail = entry.prev,
        }

        self.index.remove(&entry.id);
        self.free.push(slot);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached ids, oldest first
    pub fn ids(&self) -> Vec<ContentId> {
        let mut ids = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            match self.slots[slot].as_ref() {
                Some(entry) => {
                    ids.push(entry.id.clone());
                    cursor = entry.next;
                }
                None => break,
            }
        }
        ids
    }
}

impl std::fmt::Debug for FifoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> ContentId {
        ContentId::from(format!("id-{}", n))
    }

    #[test]
    fn test_evicts_in_insertion_order() {
        let mut cache = FifoCache::new(3);
        for n in 0..3 {
            assert_eq!(cache.put(id(n), Bytes::from(vec![n as u8])), None);
        }
        assert_eq!(cache.put(id(3), Bytes::from_static(b"3")), Some(id(0)));
        assert!(!cache.contains(&id(0)));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.ids(), vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn test_reads_do_not_promote() {
        let mut cache = FifoCache::new(2);
        cache.put(id(0), Bytes::from_static(b"a"));
        cache.put(id(1), Bytes::from_static(b"b"));
        assert!(cache.get(&id(0)).is_some());

        assert_eq!(cache.put(id(2), Bytes::from_static(b"c")), Some(id(0)));
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut cache = FifoCache::new(2);
        cache.put(id(0), Bytes::from_static(b"old"));
        cache.put(id(1), Bytes::from_static(b"b"));
        assert_eq!(cache.put(id(0), Bytes::from_static(b"new")), None);
        assert_eq!(cache.get(&id(0)), Some(Bytes::from_static(b"new")));

        assert_eq!(cache.put(id(2), Bytes::from_static(b"c")), Some(id(0)));
    }

    #[test]
    fn test_remove_relinks_and_reuses_slots() {
        let mut cache = FifoCache::new(3);
        for n in 0..3 {
            cache.put(id(n), Bytes::from_static(b"x"));
        }
        assert_eq!(cache.remove(&id(1)), Some(Bytes::from_static(b"x")));
        assert_eq!(cache.remove(&id(1)), None);
        assert_eq!(cache.ids(), vec![id(0), id(2)]);

        cache.put(id(3), Bytes::from_static(b"y"));
        assert_eq!(cache.ids(), vec![id(0), id(2), id(3)]);
        assert_eq!(cache.slots.len(), 3);

        cache.remove(&id(0));
        cache.remove(&id(3));
        assert_eq!(cache.ids(), vec![id(2)]);
        cache.remove(&id(2));
        assert!(cache.is_empty());
        assert!(cache.head.is_none() && cache.tail.is_none());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut cache = FifoCache::new(5);
        for n in 0..50 {
            cache.put(id(n), Bytes::new());
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!(cache.ids(), (45..50).map(id).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = FifoCache::new(0);
        assert_eq!(cache.put(id(0), Bytes::new()), None);
        assert!(cache.is_empty());
    }
}
