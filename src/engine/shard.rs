//! REVENANT - Sharded Concurrent Map
//! Hash-partitioned dictionary underpinning both the data table and the
//! TTL table.
//!
//! ## Design
//! - Keys are routed to a shard by a 64-bit non-cryptographic hash
//!   modulo the shard count (fixed at construction).
//! - Each shard is an independent `Mutex<HashMap>`, so contention is
//!   limited to keys that share a shard. Closure-based accessors run under
//!   the owning shard's lock, which also serializes structural mutation of
//!   the value stored there (the sorted-set skip lists rely on this).
//! - The live count is maintained by an `AtomicUsize` on insert/remove
//!   rather than by scanning, so `len()` is O(1) and eventually consistent.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A concurrent string-keyed map partitioned into lock-guarded shards.
pub struct ShardedMap<V> {
    shards: Vec<Mutex<HashMap<String, V>>>,
    len: AtomicUsize,
}

impl<V> ShardedMap<V> {
    /// Create a map with a fixed number of shards.
    pub fn new(shard_count: usize) -> Self {
        assert!(shard_count > 0, "shard_count must be positive");
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(Mutex::new(HashMap::new()));
        }
        Self {
            shards,
            len: AtomicUsize::new(0),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Insert or replace a value. Returns true if the key was new.
    pub fn insert(&self, key: &str, value: V) -> bool {
        let mut shard = self.shard(key).lock().unwrap();
        let new = shard.insert(key.to_string(), value).is_none();
        if new {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        new
    }

    /// Remove a key. Returns true if it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut shard = self.shard(key).lock().unwrap();
        let removed = shard.remove(key).is_some();
        if removed {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Returns true if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.shard(key).lock().unwrap().contains_key(key)
    }

    /// Run a closure against the value (if any) under the shard lock.
    pub fn read<R>(&self, key: &str, f: impl FnOnce(Option<&V>) -> R) -> R {
        let shard = self.shard(key).lock().unwrap();
        f(shard.get(key))
    }

    /// Run a mutating closure against the value (if any) under the shard
    /// lock. The closure must not call back into this map.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(Option<&mut V>) -> R) -> R {
        let mut shard = self.shard(key).lock().unwrap();
        f(shard.get_mut(key))
    }

    /// Get the value for a key, inserting a default first when absent, and
    /// run a mutating closure against it under the shard lock.
    pub fn update_or_insert_with<R>(
        &self,
        key: &str,
        default: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut shard = self.shard(key).lock().unwrap();
        if !shard.contains_key(key) {
            shard.insert(key.to_string(), default());
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        f(shard.get_mut(key).unwrap())
    }

    /// Clone the value out of the map.
    pub fn get_cloned(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.shard(key).lock().unwrap().get(key).cloned()
    }

    /// Visit every live entry, shard by shard, each under its own lock.
    /// The callback must not call back into this map.
    pub fn for_each(&self, mut f: impl FnMut(&str, &V)) {
        for shard in &self.shards {
            let shard = shard.lock().unwrap();
            for (key, value) in shard.iter() {
                f(key, value);
            }
        }
    }

    /// Approximate number of live entries.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns true if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
