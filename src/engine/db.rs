//! REVENANT - Logical Database Partition
//! One SELECT-able partition: the entry table, the parallel TTL table and
//! the optimistic-lock version bookkeeping.
//!
//! ## Expiry model
//! The TTL table maps key -> absolute deadline (epoch milliseconds) and is
//! consulted lazily: the first access to an expired key deletes it from
//! both tables before it is treated as absent. No background sweep exists,
//! and none is needed for the observable semantics.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use super::shard::ShardedMap;
use super::skiplist::SkipList;

/// The stored value of an entry: a plain string or a sorted set.
pub enum EntryValue {
    Str(String),
    ZSet(SkipList),
}

/// A stored value with its type tag and mutation counter.
///
/// `version` increments on every mutating command that touches the entry
/// (set, increment, sorted-set add/remove); reads never bump it. WATCH
/// snapshots the version and EXEC compares against it.
pub struct Entry {
    pub value: EntryValue,
    pub version: u64,
}

impl Entry {
    /// New string entry at version 0.
    pub fn str(value: impl Into<String>) -> Self {
        Self {
            value: EntryValue::Str(value.into()),
            version: 0,
        }
    }

    /// New empty sorted-set entry at version 0.
    pub fn zset(height: usize) -> Self {
        Self {
            value: EntryValue::ZSet(SkipList::new(height)),
            version: 0,
        }
    }

    /// Type tag as reported by the TYPE command.
    pub fn type_name(&self) -> &'static str {
        match self.value {
            EntryValue::Str(_) => "string",
            EntryValue::ZSet(_) => "zset",
        }
    }
}

/// A single logical database partition.
pub struct Db {
    data: ShardedMap<Entry>,
    ttl: ShardedMap<u64>,
    skiplist_height: usize,
}

impl Db {
    /// Create an empty partition.
    pub fn new(shard_count: usize, skiplist_height: usize) -> Self {
        Self {
            data: ShardedMap::new(shard_count),
            ttl: ShardedMap::new(shard_count),
            skiplist_height,
        }
    }

    /// Height used for sorted-set skip lists created in this partition.
    pub fn skiplist_height(&self) -> usize {
        self.skiplist_height
    }

    /// Read access to an entry under its shard lock, after lazy expiry.
    pub fn read_entry<R>(&self, key: &str, f: impl FnOnce(Option<&Entry>) -> R) -> R {
        self.expire_if_due(key);
        self.data.read(key, f)
    }

    /// Mutable access to an entry under its shard lock, after lazy expiry.
    /// The shard lock also serializes skip-list mutation for this entry.
    pub fn update_entry<R>(&self, key: &str, f: impl FnOnce(Option<&mut Entry>) -> R) -> R {
        self.expire_if_due(key);
        self.data.update(key, f)
    }

    /// Mutable access, creating the entry first when absent.
    pub fn update_or_insert_entry<R>(
        &self,
        key: &str,
        default: impl FnOnce() -> Entry,
        f: impl FnOnce(&mut Entry) -> R,
    ) -> R {
        self.expire_if_due(key);
        self.data.update_or_insert_with(key, default, f)
    }

    /// Insert or replace an entry.
    pub fn put_entry(&self, key: &str, entry: Entry) {
        self.data.insert(key, entry);
    }

    /// Delete a key from both tables. Returns true if data existed.
    pub fn remove_entry(&self, key: &str) -> bool {
        let existed = self.data.remove(key);
        self.ttl.remove(key);
        existed
    }

    /// Returns true if the key exists (and is not expired).
    pub fn contains(&self, key: &str) -> bool {
        self.read_entry(key, |e| e.is_some())
    }

    /// Current version of a key, if it exists.
    pub fn version_of(&self, key: &str) -> Option<u64> {
        self.read_entry(key, |e| e.map(|e| e.version))
    }

    /// Approximate number of live keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the partition holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Visit every live, unexpired entry. Used by AOF rewrite; expired
    /// entries are skipped so a rewritten log cannot resurrect them.
    pub fn for_each(&self, mut f: impl FnMut(&str, &Entry)) {
        self.data.for_each(|key, entry| {
            if !self.is_expired(key) {
                f(key, entry);
            }
        });
    }

    // -- TTL table ---------------------------------------------------------

    /// Attach a relative TTL in seconds. A non-positive TTL deletes the
    /// key outright; there is no "expires in 0 seconds" state. Huge TTLs
    /// saturate to a far-future deadline instead of wrapping.
    pub fn set_ttl_relative(&self, key: &str, secs: i64) {
        if secs > 0 {
            let deadline = now_ms().saturating_add((secs as u64).saturating_mul(1000));
            self.ttl.insert(key, deadline);
        } else {
            self.remove_entry(key);
        }
    }

    /// Attach an absolute deadline in Unix seconds. Deadlines not strictly
    /// in the future delete the key immediately, which makes replaying
    /// stale ABSEXPIRE records deterministic.
    pub fn set_ttl_absolute(&self, key: &str, unix_secs: i64) {
        let deadline_ms = (unix_secs.max(0) as u64).saturating_mul(1000);
        if deadline_ms > now_ms() {
            self.ttl.insert(key, deadline_ms);
        } else {
            self.remove_entry(key);
        }
    }

    /// Clear a key's TTL, making it persistent.
    pub fn clear_ttl(&self, key: &str) {
        self.ttl.remove(key);
    }

    /// Remaining TTL in whole seconds, -1 when the key has no TTL.
    pub fn ttl_secs(&self, key: &str) -> i64 {
        self.ttl.read(key, |deadline| match deadline {
            Some(&deadline) => {
                let now = now_ms();
                if deadline <= now {
                    0
                } else {
                    ((deadline - now) / 1000) as i64
                }
            }
            None => -1,
        })
    }

    // -- optimistic locking ------------------------------------------------

    /// Compare each watched key's current version (or absence) with the
    /// version recorded at WATCH time. Any mismatch means the transaction
    /// must abort.
    pub fn watch_unchanged(&self, watch: &HashMap<String, u64>) -> bool {
        watch
            .iter()
            .all(|(key, &version)| self.version_of(key) == Some(version))
    }

    fn is_expired(&self, key: &str) -> bool {
        self.ttl
            .read(key, |deadline| deadline.map(|&d| d <= now_ms()))
            .unwrap_or(false)
    }

    fn expire_if_due(&self, key: &str) {
        if self.is_expired(key) {
            self.remove_entry(key);
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Current time in whole seconds since the Unix epoch.
pub fn now_secs() -> i64 {
    (now_ms() / 1000) as i64
}
