// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The bounded cache and its intrusive recency list.

use alloc::vec::Vec;
use core::fmt;
use core::hash::Hash;

use hashbrown::HashMap;

const NIL: usize = usize::MAX;

struct Entry<K, V> {
    key: K,
    value: V,
    /// Towards the most recently used end.
    prev: usize,
    /// Towards the least recently used end.
    next: usize,
}

/// A fixed-capacity map that evicts its least recently used entry.
///
/// See the [crate documentation](crate) for the recency rules.
///
/// The capacity is clamped to at least one entry.
pub struct LruCache<K, V> {
    entries: Vec<Entry<K, V>>,
    index: HashMap<K, usize>,
    /// Most recently used entry.
    head: usize,
    /// Least recently used entry.
    tail: usize,
    capacity: usize,
}

impl<K, V> fmt::Debug for LruCache<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("entries", &DebugEntries(self))
            .finish_non_exhaustive()
    }
}

struct DebugEntries<'a, K, V>(&'a LruCache<K, V>);

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for DebugEntries<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<K, V> LruCache<K, V> {
    /// Returns the maximum number of entries held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cache: self,
            cursor: self.head,
        }
    }

    /// Iterates keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Iterates values from most to least recently used.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Returns the least recently used entry without touching it.
    pub fn peek_lru(&self) -> Option<(&K, &V)> {
        self.entries.get(self.tail).map(|e| (&e.key, &e.value))
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let e = &self.entries[slot];
            (e.prev, e.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.entries[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.entries[next].prev = prev;
        }
        let e = &mut self.entries[slot];
        e.prev = NIL;
        e.next = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let e = &mut self.entries[slot];
            e.prev = NIL;
            e.next = old_head;
        }
        if old_head == NIL {
            self.tail = slot;
        } else {
            self.entries[old_head].prev = slot;
        }
        self.head = slot;
    }

    fn touch(&mut self, slot: usize) {
        if self.head != slot {
            self.unlink(slot);
            self.push_front(slot);
        }
    }
}

impl<K, V> LruCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates an empty cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            capacity: capacity.max(1),
        }
    }

    /// Returns `true` if `key` is present. Does not change recency.
    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the value for `key` without touching it.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&slot| &self.entries[slot].value)
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.touch(slot);
        Some(&self.entries[slot].value)
    }

    /// Returns the value for `key` mutably and marks it most recently used.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let slot = *self.index.get(key)?;
        self.touch(slot);
        Some(&mut self.entries[slot].value)
    }

    /// Inserts or replaces `key`, marking it most recently used.
    ///
    /// Returns the entry that had to make room for it, if any. Replacing an
    /// existing key never evicts; the previous value is dropped.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].value = value;
            self.touch(slot);
            return None;
        }
        let evicted = if self.entries.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };
        let slot = self.entries.len();
        self.entries.push(Entry {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        });
        self.index.insert(key, slot);
        self.push_front(slot);
        evicted
    }

    /// Returns the value for `key`, inserting `make()` first if it is missing.
    ///
    /// An entry evicted to make room is dropped.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let slot = match self.index.get(&key) {
            Some(&slot) => {
                self.touch(slot);
                slot
            }
            None => {
                self.insert(key.clone(), make());
                self.index[&key]
            }
        };
        &mut self.entries[slot].value
    }

    /// Removes and returns the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        if self.tail == NIL {
            return None;
        }
        let slot = self.tail;
        Some(self.remove_slot(slot))
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = *self.index.get(key)?;
        Some(self.remove_slot(slot).1)
    }

    /// Keeps only the entries for which `keep` returns `true`.
    ///
    /// Surviving entries keep their relative recency.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        let doomed: Vec<K> = self
            .entries
            .iter_mut()
            .filter_map(|e| (!keep(&e.key, &mut e.value)).then(|| e.key.clone()))
            .collect();
        for key in doomed {
            self.remove(&key);
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Changes the capacity, evicting least recently used entries as needed.
    ///
    /// Evicted entries are returned from least to most recently used.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<(K, V)> {
        self.capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            if let Some(e) = self.pop_lru() {
                evicted.push(e);
            }
        }
        evicted
    }

    fn remove_slot(&mut self, slot: usize) -> (K, V) {
        self.unlink(slot);
        let last = self.entries.len() - 1;
        if slot != last {
            // Repoint the neighbours and index of the entry about to move.
            let (prev, next) = {
                let e = &self.entries[last];
                (e.prev, e.next)
            };
            if prev == NIL {
                self.head = slot;
            } else {
                self.entries[prev].next = slot;
            }
            if next == NIL {
                self.tail = slot;
            } else {
                self.entries[next].prev = slot;
            }
            let moved_key = self.entries[last].key.clone();
            self.index.insert(moved_key, slot);
        }
        let entry = self.entries.swap_remove(slot);
        self.index.remove(&entry.key);
        (entry.key, entry.value)
    }
}

/// Iterator over a [`LruCache`] from most to least recently used.
pub struct Iter<'a, K, V> {
    cache: &'a LruCache<K, V>,
    cursor: usize,
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("cursor", &self.cursor).finish_non_exhaustive()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let e = self.cache.entries.get(self.cursor)?;
        self.cursor = e.next;
        Some((&e.key, &e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn keys(cache: &LruCache<u32, u32>) -> Vec<u32> {
        cache.keys().copied().collect()
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(3);
        assert_eq!(cache.insert(1, 10), None);
        assert_eq!(cache.insert(2, 20), None);
        assert_eq!(cache.insert(3, 30), None);
        assert_eq!(cache.insert(4, 40), Some((1, 10)));
        assert_eq!(keys(&cache), vec![4, 3, 2]);
    }

    #[test]
    fn get_touches_but_peek_does_not() {
        let mut cache = LruCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        assert_eq!(cache.peek(&1), Some(&10));
        assert_eq!(cache.peek_lru(), Some((&1, &10)));
        assert_eq!(cache.get(&1), Some(&10));
        assert_eq!(cache.peek_lru(), Some((&2, &20)));
        assert_eq!(cache.insert(3, 30), Some((2, 20)));
    }

    #[test]
    fn replace_does_not_evict() {
        let mut cache = LruCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        assert_eq!(cache.insert(1, 11), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(keys(&cache), vec![1, 2]);
        assert_eq!(cache.peek(&1), Some(&11));
    }

    #[test]
    fn remove_keeps_links_consistent() {
        let mut cache = LruCache::new(4);
        for k in 1..=4 {
            cache.insert(k, k * 10);
        }
        // Remove from the middle, the head and the tail.
        assert_eq!(cache.remove(&2), Some(20));
        assert_eq!(keys(&cache), vec![4, 3, 1]);
        assert_eq!(cache.remove(&4), Some(40));
        assert_eq!(keys(&cache), vec![3, 1]);
        assert_eq!(cache.remove(&1), Some(10));
        assert_eq!(keys(&cache), vec![3]);
        assert_eq!(cache.remove(&1), None);
        cache.insert(5, 50);
        assert_eq!(keys(&cache), vec![5, 3]);
        assert_eq!(cache.get(&3), Some(&30));
        assert_eq!(keys(&cache), vec![3, 5]);
    }

    #[test]
    fn get_or_insert_with_only_builds_once() {
        let mut cache = LruCache::new(2);
        let mut built = 0;
        for _ in 0..3 {
            *cache.get_or_insert_with(7, || {
                built += 1;
                0
            }) += 1;
        }
        assert_eq!(built, 1);
        assert_eq!(cache.peek(&7), Some(&3));
    }

    #[test]
    fn retain_drops_rejected_entries() {
        let mut cache = LruCache::new(8);
        for k in 1..=6 {
            cache.insert(k, k);
        }
        cache.retain(|k, _| k % 2 == 0);
        assert_eq!(keys(&cache), vec![6, 4, 2]);
        cache.retain(|_, _| false);
        assert!(cache.is_empty());
        assert_eq!(cache.peek_lru(), None);
    }

    #[test]
    fn shrinking_capacity_evicts_in_order() {
        let mut cache = LruCache::new(4);
        for k in 1..=4 {
            cache.insert(k, k);
        }
        let evicted = cache.set_capacity(2);
        assert_eq!(evicted, vec![(1, 1), (2, 2)]);
        assert_eq!(keys(&cache), vec![4, 3]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = LruCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(1, 1);
        assert_eq!(cache.insert(2, 2), Some((1, 1)));
    }
}
