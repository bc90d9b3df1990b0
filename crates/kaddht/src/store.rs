// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The TTL-bound value store: `key -> bytes` with an origin flag driving
//! republication and on-path refresh on every successful read.

use crate::id::Id;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A stored value plus its lease and publication bookkeeping.
#[derive(Clone)]
pub struct Value {
    pub bytes: Vec<u8>,
    pub ttl: Duration,
    pub expires_at: Instant,
    /// Set when this node is the original publisher; drives republication.
    pub origin: bool,
    pub last_publish: Instant,
}

/// Interval the background GC task scans at, per §4.6.
pub const GC_INTERVAL: Duration = Duration::from_secs(60);

/// An in-memory, TTL-bound `key -> Value` map. Many readers, many writers,
/// a single `parking_lot::RwLock` per §5's shared-resource policy.
pub struct Store {
    entries: RwLock<HashMap<Id, Value>>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a value, extending its lease to `now + ttl` on a hit — the
    /// "on-path refresh lease" every successful read grants.
    pub fn get(&self, key: &Id) -> Option<Vec<u8>> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(key)?;
        entry.expires_at = Instant::now() + entry.ttl;
        Some(entry.bytes.clone())
    }

    /// Insert or overwrite a value, setting `expires_at = now + ttl`.
    pub fn put(&self, key: Id, bytes: Vec<u8>, ttl: Duration, origin: bool) {
        let now = Instant::now();
        self.entries.write().insert(
            key,
            Value {
                bytes,
                ttl,
                expires_at: now + ttl,
                origin,
                last_publish: now,
            },
        );
    }

    /// Extend an existing entry's lease without changing its bytes or
    /// origin flag — used to serve inbound `REFRESH`. No-op if absent.
    pub fn extend_lease(&self, key: &Id) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Instant::now() + entry.ttl;
        }
    }

    /// Remove an entry. Returns whether it existed.
    pub fn forget(&self, key: &Id) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Keys whose origin value hasn't been republished within `period`.
    pub fn iter_origin_due(&self, now: Instant, period: Duration) -> Vec<Id> {
        self.entries
            .read()
            .iter()
            .filter(|(_, v)| v.origin && now.duration_since(v.last_publish) >= period)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Mark a key's `last_publish` as now, regardless of the republish
    /// attempt's outcome (§4.7 step 3).
    pub fn mark_published(&self, key: &Id) {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.last_publish = Instant::now();
        }
    }

    /// Remove every entry whose `expires_at` has passed.
    pub fn gc(&self, now: Instant) {
        self.entries.write().retain(|_, v| v.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Spawn the periodic background GC task described in §4.6.
    pub fn spawn_gc(self: &Arc<Self>) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GC_INTERVAL);
            loop {
                ticker.tick().await;
                store.gc(Instant::now());
            }
        });
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = Store::new();
        let key = Id::random();
        store.put(key, b"hello world".to_vec(), Duration::from_secs(60), true);
        assert_eq!(store.get(&key).unwrap(), b"hello world");
    }

    #[test]
    fn get_extends_lease() {
        let store = Store::new();
        let key = Id::random();
        store.put(key, b"v".to_vec(), Duration::from_millis(50), false);
        std::thread::sleep(Duration::from_millis(30));
        store.get(&key); // refresh
        store.gc(Instant::now() + Duration::from_millis(40));
        // had the read not refreshed, this entry would already be gone
        assert!(store.get(&key).is_some());
    }

    #[test]
    fn gc_removes_expired_entries() {
        let store = Store::new();
        let key = Id::random();
        store.put(key, b"v".to_vec(), Duration::from_millis(10), false);
        store.gc(Instant::now() + Duration::from_millis(50));
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn forget_reports_whether_entry_existed() {
        let store = Store::new();
        let key = Id::random();
        assert!(!store.forget(&key));
        store.put(key, b"v".to_vec(), Duration::from_secs(1), false);
        assert!(store.forget(&key));
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn iter_origin_due_filters_by_origin_and_period() {
        let store = Store::new();
        let origin_key = Id::random();
        let non_origin_key = Id::random();
        store.put(origin_key, b"v".to_vec(), Duration::from_secs(10), true);
        store.put(non_origin_key, b"v".to_vec(), Duration::from_secs(10), false);

        let due = store.iter_origin_due(Instant::now() + Duration::from_millis(5), Duration::from_millis(1));
        assert_eq!(due, vec![origin_key]);
    }

    #[test]
    fn mark_published_resets_due_window() {
        let store = Store::new();
        let key = Id::random();
        store.put(key, b"v".to_vec(), Duration::from_secs(10), true);
        std::thread::sleep(Duration::from_millis(20));
        store.mark_published(&key);
        let due = store.iter_origin_due(Instant::now(), Duration::from_millis(10));
        assert!(due.is_empty());
    }
}
