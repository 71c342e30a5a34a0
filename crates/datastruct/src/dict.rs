//! Open-chained hash table with incremental rehashing.
//!
//! This is the substrate underneath every keyspace and every composite
//! value kind (`Set` is a `Dict` with unit values, `Zset` pairs a `Dict`
//! with a [`crate::skiplist::Skiplist`]). Expansion never stalls the
//! event loop: growing the table allocates a second, larger table and
//! migrates one bucket per subsequent operation until the old table is
//! empty.

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

const TABLE_INITIAL_SIZE: usize = 4;
const FORCE_RESIZE_RATIO: usize = 1;
const REHASH_STEP_COUNT: usize = 1;

/// Errors specific to [`Dict`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DictError {
    /// `delete` was called before the table was ever allocated.
    #[error("dict not initialized")]
    NotInitialized,
    /// `delete` targeted a key that isn't present.
    #[error("key not found")]
    KeyNotFound,
}

struct Entry<K, V> {
    key: K,
    value: V,
    next: Option<Box<Entry<K, V>>>,
}

struct Table<K, V> {
    buckets: Vec<Option<Box<Entry<K, V>>>>,
    size: usize,
    mask: usize,
    used: usize,
}

impl<K, V> Table<K, V> {
    fn with_size(size: usize) -> Self {
        let mut buckets = Vec::with_capacity(size);
        buckets.resize_with(size, || None);
        Table {
            buckets,
            size,
            mask: size - 1,
            used: 0,
        }
    }
}

/// Two-table open-chaining hash map with incremental rehashing.
///
/// `rehash_idx` is `-1` when the dict is not rehashing; otherwise it is
/// the next bucket of `tables[0]` to migrate into `tables[1]`.
pub struct Dict<K, V> {
    tables: [Option<Table<K, V>>; 2],
    rehash_idx: isize,
    iterators: Cell<usize>,
}

impl<K, V> Default for Dict<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V> Dict<K, V> {
    /// Creates an empty dict. The first table is allocated lazily on
    /// the first `set`.
    pub fn new() -> Self {
        Dict {
            tables: [None, None],
            rehash_idx: -1,
            iterators: Cell::new(0),
        }
    }

    fn is_rehashing(&self) -> bool {
        self.rehash_idx != -1
    }

    fn hash_of<Q: Hash>(key: &Q) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Inserts or updates `key`. Returns `true` if the key is new.
    pub fn set(&mut self, key: K, value: V) -> bool {
        self.expand_if_needed();
        self.rehash_step();

        let hash = Self::hash_of(&key);

        if let Some(slot) = Self::find_mut_in(&mut self.tables, hash, &key) {
            slot.value = value;
            return false;
        }

        let table_idx = if self.is_rehashing() { 1 } else { 0 };
        let table = self.tables[table_idx].as_mut().expect("table allocated");
        let idx = (hash as usize) & table.mask;
        let next = table.buckets[idx].take();
        table.buckets[idx] = Some(Box::new(Entry { key, value, next }));
        table.used += 1;
        true
    }

    /// Looks up `key`, stepping the rehash if one is in progress.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.rehash_step();
        let hash = Self::hash_of(key);
        Self::find_in(&self.tables, hash, key).map(|e| &e.value)
    }

    /// Mutable lookup, same rehash-stepping behaviour as [`Dict::get`].
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.rehash_step();
        let hash = Self::hash_of(key);
        Self::find_mut_in(&mut self.tables, hash, key).map(|e| &mut e.value)
    }

    /// True if `key` is present, without returning the value.
    pub fn contains_key(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key`. Errors if the table was never initialized or the
    /// key isn't present.
    pub fn delete(&mut self, key: &K) -> Result<V, DictError> {
        if self.tables[0].is_none() {
            return Err(DictError::NotInitialized);
        }
        self.rehash_step();

        let hash = Self::hash_of(key);
        let scan_second = self.is_rehashing();
        for table_idx in 0..=(if scan_second { 1 } else { 0 }) {
            let table = self.tables[table_idx].as_mut().expect("table allocated");
            let idx = (hash as usize) & table.mask;
            let mut cursor = &mut table.buckets[idx];
            loop {
                let found = match cursor {
                    Some(entry) => entry.key == *key,
                    None => break,
                };
                if found {
                    let mut boxed = cursor.take().expect("checked Some above");
                    *cursor = boxed.next.take();
                    table.used -= 1;
                    return Ok(boxed.value);
                }
                cursor = &mut cursor.as_mut().expect("checked Some above").next;
            }
        }

        Err(DictError::KeyNotFound)
    }

    /// Number of live entries across both tables.
    pub fn len(&self) -> usize {
        let mut n = 0;
        if let Some(t) = &self.tables[0] {
            n += t.used;
        }
        if let Some(t) = &self.tables[1] {
            n += t.used;
        }
        n
    }

    /// True if the dict holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks a uniformly random live entry, or `None` if empty.
    ///
    /// While rehashing, the bucket is drawn uniformly from the union of
    /// the unmigrated tail of `tables[0]` and all of `tables[1]`, so
    /// already-migrated buckets aren't sampled twice.
    pub fn random_entry(&mut self) -> Option<(&K, &V)> {
        if self.tables[0].is_none() || self.is_empty() {
            return None;
        }
        self.rehash_step();

        let entry = if self.is_rehashing() {
            let t0 = self.tables[0].as_ref().unwrap();
            let t1 = self.tables[1].as_ref().unwrap();
            let tail0 = t0.size as isize - self.rehash_idx;
            let total = tail0 + t1.size as isize;
            loop {
                let pick = rand::random::<u64>() as isize % total;
                let bucket = if pick < tail0 {
                    &t0.buckets[(self.rehash_idx + pick) as usize]
                } else {
                    &t1.buckets[(pick - tail0) as usize]
                };
                if bucket.is_some() {
                    break bucket;
                }
            }
        } else {
            let t0 = self.tables[0].as_ref().unwrap();
            loop {
                let idx = rand::random::<usize>() % t0.size;
                if t0.buckets[idx].is_some() {
                    break &t0.buckets[idx];
                }
            }
        };

        let mut chain_len = 0usize;
        let mut cursor = entry.as_deref();
        while let Some(e) = cursor {
            chain_len += 1;
            cursor = e.next.as_deref();
        }
        let pick = rand::random::<usize>() % chain_len;
        let mut cursor = entry.as_deref();
        for _ in 0..pick {
            cursor = cursor.and_then(|e| e.next.as_deref());
        }
        cursor.map(|e| (&e.key, &e.value))
    }

    /// Borrows an iterator over every live entry. While any iterator is
    /// outstanding, [`Dict::rehash_step`] becomes a no-op (see module
    /// docs); this mirrors the source's rehash-suppression contract,
    /// though in practice the borrow checker already forbids mutating
    /// `self` for the iterator's lifetime.
    pub fn iter(&self) -> DictIter<'_, K, V> {
        self.iterators.set(self.iterators.get() + 1);
        DictIter {
            dict: self,
            table: 0,
            index: 0,
            cursor: None,
            done: self.tables[0].is_none(),
        }
    }

    /// Deep-copies every entry into a freshly allocated `Dict`, walking
    /// via the iterator protocol so an in-progress rehash is never
    /// observed half-migrated. Used by the AOF background rewrite to
    /// snapshot a database without pausing the event loop.
    pub fn deep_copy(&self) -> Dict<K, V>
    where
        K: Clone,
        V: Clone,
    {
        let mut copy = Dict::new();
        for (k, v) in self.iter() {
            copy.set(k.clone(), v.clone());
        }
        copy
    }

    fn expand_if_needed(&mut self) {
        if self.is_rehashing() {
            return;
        }
        match &self.tables[0] {
            None => self.expand(TABLE_INITIAL_SIZE),
            Some(t) if t.used / t.size.max(1) > FORCE_RESIZE_RATIO => {
                self.expand(t.size * 2)
            }
            Some(_) => {}
        }
    }

    fn expand(&mut self, min_size: usize) {
        let size = next_power_of_two(min_size);
        let table = Table::with_size(size);
        if self.tables[0].is_none() {
            self.tables[0] = Some(table);
            return;
        }
        self.tables[1] = Some(table);
        self.rehash_idx = 0;
    }

    /// Advances the rehash by [`REHASH_STEP_COUNT`] buckets, unless an
    /// iterator is outstanding.
    fn rehash_step(&mut self) {
        if self.iterators.get() > 0 || !self.is_rehashing() {
            return;
        }
        for _ in 0..REHASH_STEP_COUNT {
            if !self.is_rehashing() {
                break;
            }
            let done = {
                let t0 = self.tables[0].as_ref().unwrap();
                t0.used == 0
            };
            if done {
                self.tables[0] = self.tables[1].take();
                self.rehash_idx = -1;
                return;
            }

            while self.tables[0].as_ref().unwrap().buckets[self.rehash_idx as usize].is_none() {
                self.rehash_idx += 1;
            }

            let idx = self.rehash_idx as usize;
            let mut entry = self.tables[0].as_mut().unwrap().buckets[idx].take();
            while let Some(mut boxed) = entry {
                let next = boxed.next.take();
                let hash = Self::hash_of(&boxed.key);
                let t1 = self.tables[1].as_mut().unwrap();
                let new_idx = (hash as usize) & t1.mask;
                boxed.next = t1.buckets[new_idx].take();
                t1.buckets[new_idx] = Some(boxed);
                t1.used += 1;
                self.tables[0].as_mut().unwrap().used -= 1;
                entry = next;
            }

            self.rehash_idx += 1;
        }
    }

    fn find_in<'a>(tables: &'a [Option<Table<K, V>>; 2], hash: u64, key: &K) -> Option<&'a Entry<K, V>> {
        for table in tables.iter().flatten() {
            let idx = (hash as usize) & table.mask;
            let mut cursor = table.buckets[idx].as_deref();
            while let Some(entry) = cursor {
                if entry.key == *key {
                    return Some(entry);
                }
                cursor = entry.next.as_deref();
            }
        }
        None
    }

    fn find_mut_in<'a>(
        tables: &'a mut [Option<Table<K, V>>; 2],
        hash: u64,
        key: &K,
    ) -> Option<&'a mut Entry<K, V>> {
        for table in tables.iter_mut().flatten() {
            let idx = (hash as usize) & table.mask;
            if let Some(entry) = Self::find_mut_in_bucket(&mut table.buckets[idx], key) {
                return Some(entry);
            }
        }
        None
    }

    fn find_mut_in_bucket<'a>(
        bucket: &'a mut Option<Box<Entry<K, V>>>,
        key: &K,
    ) -> Option<&'a mut Entry<K, V>> {
        let mut cursor = bucket.as_deref_mut();
        while let Some(entry) = cursor {
            if entry.key == *key {
                return Some(entry);
            }
            cursor = entry.next.as_deref_mut();
        }
        None
    }
}

/// Iterator produced by [`Dict::iter`]. Releasing it (via `Drop`)
/// decrements the outstanding-iterator count, re-enabling rehash steps.
pub struct DictIter<'a, K, V> {
    dict: &'a Dict<K, V>,
    table: usize,
    index: usize,
    cursor: Option<&'a Entry<K, V>>,
    done: bool,
}

impl<'a, K, V> Iterator for DictIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(entry) = self.cursor {
                self.cursor = entry.next.as_deref();
                return Some((&entry.key, &entry.value));
            }

            let table = match &self.dict.tables[self.table] {
                Some(t) => t,
                None => {
                    self.done = true;
                    return None;
                }
            };
            if self.index >= table.size {
                if self.table == 0 && self.dict.is_rehashing() {
                    self.table = 1;
                    self.index = 0;
                    continue;
                }
                self.done = true;
                return None;
            }
            self.cursor = table.buckets[self.index].as_deref();
            self.index += 1;
        }
    }
}

impl<'a, K, V> Drop for DictIter<'a, K, V> {
    fn drop(&mut self) {
        self.dict.iterators.set(self.dict.iterators.get() - 1);
    }
}

/// Rounds `size` up to the next power of two, at least `TABLE_INITIAL_SIZE`.
pub fn next_power_of_two(size: usize) -> usize {
    if size <= TABLE_INITIAL_SIZE {
        return TABLE_INITIAL_SIZE;
    }
    size.next_power_of_two()
}
