// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A per-worker, thread-safe LRU cache of whole file contents.
//!
//! Entries live in an arena (`Vec<Option<CacheEntry>>`) addressed by stable slot index;
//! a `HashMap<String, usize>` maps keys to slots, and an intrusive doubly linked list
//! over those same indices tracks recency. A pinned entry (one with an outstanding
//! [`CacheHandle`]) is never evicted, even if it is the least recently used.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

struct CacheEntry {
    key: String,
    bytes: Arc<[u8]>,
    pin_count: u32,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A point-in-time view of cache occupancy and hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of distinct resources currently cached.
    pub items: usize,
    /// Bytes currently held by cached entries.
    pub bytes_used: usize,
    /// The cache's byte capacity.
    pub capacity: usize,
    /// Successful lookups that found an existing entry.
    pub hits: u64,
    /// Lookups that required a load from disk.
    pub misses: u64,
    /// Entries removed to make room for a new one.
    pub evictions: u64,
}

struct Inner {
    entries: Vec<Option<CacheEntry>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    mru: Option<usize>,
    lru: Option<usize>,
    capacity_bytes: usize,
    bytes_used: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Inner {
    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let entry = self.entries[slot].as_ref().unwrap();
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.entries[p].as_mut().unwrap().next = next,
            None => self.mru = next,
        }
        match next {
            Some(n) => self.entries[n].as_mut().unwrap().prev = prev,
            None => self.lru = prev,
        }
    }

    fn link_at_mru(&mut self, slot: usize) {
        let old_mru = self.mru;
        {
            let entry = self.entries[slot].as_mut().unwrap();
            entry.prev = None;
            entry.next = old_mru;
        }
        if let Some(old) = old_mru {
            self.entries[old].as_mut().unwrap().prev = Some(slot);
        }
        self.mru = Some(slot);
        if self.lru.is_none() {
            self.lru = Some(slot);
        }
    }

    fn touch(&mut self, slot: usize) {
        if self.mru == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.link_at_mru(slot);
    }

    fn alloc_slot(&mut self, entry: CacheEntry) -> usize {
        if let Some(slot) = self.free.pop() {
            self.entries[slot] = Some(entry);
            slot
        } else {
            self.entries.push(Some(entry));
            self.entries.len() - 1
        }
    }

    fn remove_slot(&mut self, slot: usize) {
        self.unlink(slot);
        let entry = self.entries[slot].take().unwrap();
        self.index.remove(&entry.key);
        self.bytes_used -= entry.bytes.len();
        self.free.push(slot);
    }

    /// Walks from the least-recently-used end toward the most-recently-used end, removing
    /// the first unpinned entry found, repeating while still over capacity. Stops as soon
    /// as a pass finds no unpinned entry to remove, even if still over capacity.
    fn evict_while_over_capacity(&mut self) {
        while self.bytes_used > self.capacity_bytes {
            let mut cursor = self.lru;
            let mut victim = None;
            while let Some(slot) = cursor {
                let entry = self.entries[slot].as_ref().unwrap();
                if entry.pin_count == 0 {
                    victim = Some(slot);
                    break;
                }
                cursor = entry.prev;
            }
            match victim {
                Some(slot) => {
                    self.remove_slot(slot);
                    self.evictions += 1;
                }
                None => break,
            }
        }
    }
}

/// A thread-safe LRU cache, sized in bytes.
pub struct Cache {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

/// A pinned reference to cached bytes. Dropping the handle unpins the entry exactly once,
/// making it eligible for eviction again.
pub struct CacheHandle<'a> {
    cache: &'a Cache,
    slot: usize,
    bytes: Arc<[u8]>,
}

impl<'a> std::fmt::Debug for CacheHandle<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("slot", &self.slot)
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

impl<'a> CacheHandle<'a> {
    /// The cached file contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The length of the cached file contents.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the cached file is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<'a> Drop for CacheHandle<'a> {
    fn drop(&mut self) {
        self.cache.unpin(self.slot);
    }
}

impl Cache {
    /// Creates an empty cache with the given byte capacity.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                free: Vec::new(),
                index: HashMap::new(),
                mru: None,
                lru: None,
                capacity_bytes,
                bytes_used: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Pins and returns the entry for `key` if present, without touching the filesystem.
    pub fn try_pin(&self, key: &str) -> Option<CacheHandle<'_>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&slot) = inner.index.get(key) {
            inner.touch(slot);
            let bytes = {
                let entry = inner.entries[slot].as_mut().unwrap();
                entry.pin_count += 1;
                entry.bytes.clone()
            };
            inner.hits += 1;
            Some(CacheHandle {
                cache: self,
                slot,
                bytes,
            })
        } else {
            inner.misses += 1;
            None
        }
    }

    /// Returns a pinned handle for `key`, reading `absolute_path` from disk on a miss.
    ///
    /// The file read happens outside the cache mutex; the result is re-checked against the
    /// index once the mutex is reacquired, so two concurrent misses for the same key cannot
    /// both insert a copy (the loser's read is kept alive only long enough to build the
    /// handle, then discarded).
    pub fn pin_or_load(&self, key: &str, absolute_path: &Path) -> io::Result<CacheHandle<'_>> {
        if let Some(handle) = self.try_pin(key) {
            return Ok(handle);
        }

        let data = std::fs::read(absolute_path)?;
        let bytes: Arc<[u8]> = Arc::from(data.into_boxed_slice());

        let mut inner = self.inner.lock().unwrap();
        if let Some(&slot) = inner.index.get(key) {
            // Another thread inserted this key while we were reading the file.
            inner.touch(slot);
            let bytes = {
                let entry = inner.entries[slot].as_mut().unwrap();
                entry.pin_count += 1;
                entry.bytes.clone()
            };
            return Ok(CacheHandle {
                cache: self,
                slot,
                bytes,
            });
        }

        let size = bytes.len();
        let slot = inner.alloc_slot(CacheEntry {
            key: key.to_string(),
            bytes: bytes.clone(),
            pin_count: 1,
            prev: None,
            next: None,
        });
        inner.index.insert(key.to_string(), slot);
        inner.link_at_mru(slot);
        inner.bytes_used += size;
        inner.evict_while_over_capacity();

        Ok(CacheHandle {
            cache: self,
            slot,
            bytes,
        })
    }

    fn unpin(&self, slot: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries[slot].as_mut() {
            debug_assert!(entry.pin_count > 0);
            entry.pin_count = entry.pin_count.saturating_sub(1);
        }
        if inner.bytes_used > inner.capacity_bytes {
            inner.evict_while_over_capacity();
        }
    }

    /// Removes `key` from the cache if present and currently unpinned.
    ///
    /// Returns `false` without doing anything if the entry is absent or still pinned.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&slot) = inner.index.get(key) {
            if inner.entries[slot].as_ref().unwrap().pin_count == 0 {
                inner.remove_slot(slot);
                return true;
            }
        }
        false
    }

    /// A snapshot of the cache's current occupancy and counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            items: inner.index.len(),
            bytes_used: inner.bytes_used,
            capacity: inner.capacity_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Barrier;
    use std::thread;

    fn write_temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn miss_then_hit() {
        let cache = Cache::new(1024 * 1024);
        let file = write_temp_file(b"hello world");

        {
            let handle = cache.pin_or_load("k", file.path()).unwrap();
            assert_eq!(handle.bytes(), b"hello world");
        }
        assert_eq!(cache.stats().misses, 1);

        let handle = cache.pin_or_load("k", file.path()).unwrap();
        assert_eq!(handle.bytes(), b"hello world");
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn evicts_lru_unpinned_entry_when_over_capacity() {
        let cache = Cache::new(12);
        let a = write_temp_file(b"0123456789");
        let b = write_temp_file(b"abcdefghij");

        {
            let _h = cache.pin_or_load("a", a.path()).unwrap();
        }
        {
            let _h = cache.pin_or_load("b", b.path()).unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert!(cache.try_pin("a").is_none());
        assert!(cache.try_pin("b").is_some());
    }

    #[test]
    fn pinned_entry_survives_eviction_pressure() {
        let cache = Cache::new(12);
        let a = write_temp_file(b"0123456789");
        let b = write_temp_file(b"abcdefghij");

        let pinned_a = cache.pin_or_load("a", a.path()).unwrap();
        {
            let _h = cache.pin_or_load("b", b.path()).unwrap();
        }

        // "a" is pinned and over-capacity eviction could not touch it.
        assert_eq!(pinned_a.bytes(), b"0123456789");
        drop(pinned_a);

        // now that it's unpinned, a fresh insert can reclaim its bytes.
        let c = write_temp_file(b"klmnopqrst");
        {
            let _h = cache.pin_or_load("c", c.path()).unwrap();
        }
        assert!(cache.try_pin("a").is_none());
    }

    #[test]
    fn invalidate_refuses_pinned_entry() {
        let cache = Cache::new(1024);
        let file = write_temp_file(b"data");
        let handle = cache.pin_or_load("k", file.path()).unwrap();
        assert!(!cache.invalidate("k"));
        drop(handle);
        assert!(cache.invalidate("k"));
    }

    #[test]
    fn concurrent_readers_see_consistent_bytes() {
        let cache = Arc::new(Cache::new(1024 * 1024));
        let file = write_temp_file(b"concurrent cache contents");
        let path = Arc::new(file.path().to_path_buf());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let path = path.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..100 {
                        let handle = cache.pin_or_load("k", &path).unwrap();
                        assert_eq!(handle.bytes(), b"concurrent cache contents");
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.stats().hits > 0);
    }
}
