// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The routing table: an ordered collection of k-buckets spanning the full
//! ID space, with the relaxed-bucket split policy.
//!
//! Locking follows the bucket-lock-under-table-read-lock protocol from the
//! original implementation's `RoutingTable.Update`: a lookup takes the
//! table's reader lock only long enough to find and clone the bucket handle,
//! upserts under the bucket's own lock, and only escalates to the table's
//! writer lock to splice in split children.

use crate::bucket::{Bucket, Upsert, DEFAULT_B, DEFAULT_K};
use crate::contact::Contact;
use crate::error::{Error, Result};
use crate::id::Id;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

type BucketHandle = Arc<Mutex<Bucket>>;

/// An ordered sequence of k-buckets partitioning `[0, 2^160-1]`, plus the
/// owning node's id.
pub struct RoutingTable {
    self_id: Id,
    k: usize,
    b: u32,
    buckets: RwLock<Vec<BucketHandle>>,
}

impl RoutingTable {
    pub fn new(self_id: Id) -> Self {
        Self::with_params(self_id, DEFAULT_K, DEFAULT_B)
    }

    pub fn with_params(self_id: Id, k: usize, b: u32) -> Self {
        let whole_range = Bucket::new(Id([0u8; 20]), Id([0xff; 20]), k, b);
        Self {
            self_id,
            k,
            b,
            buckets: RwLock::new(vec![Arc::new(Mutex::new(whole_range))]),
        }
    }

    pub fn self_id(&self) -> Id {
        self.self_id
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of buckets currently in the table (exposed for tests/admin).
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    fn bucket_index_for(buckets: &[BucketHandle], id: &Id) -> Option<usize> {
        buckets.iter().position(|b| b.lock().contains(id))
    }

    /// Insert position that keeps the bucket list sorted by `lower`.
    fn insert_sorted(buckets: &mut Vec<BucketHandle>, bucket: Bucket) {
        let lower = bucket.lower;
        let pos = buckets
            .iter()
            .position(|b| b.lock().lower >= lower)
            .unwrap_or(buckets.len());
        buckets.insert(pos, Arc::new(Mutex::new(bucket)));
    }

    /// Locate the bucket containing `c.id`, attempt `upsert`. On a full
    /// bucket, apply the split-or-drop policy and retry.
    pub fn update(&self, c: Contact) {
        loop {
            let table_guard = self.buckets.read();
            let idx = match Self::bucket_index_for(&table_guard, &c.id) {
                Some(i) => i,
                None => return,
            };
            let bucket_arc = table_guard[idx].clone();
            drop(table_guard);

            let result = bucket_arc.lock().upsert(c.clone());
            if result == Upsert::Ok {
                return;
            }

            // Bucket is full: decide whether to split under the writer lock.
            let mut table_guard = self.buckets.write();
            let still_idx = table_guard.iter().position(|b| Arc::ptr_eq(b, &bucket_arc));
            let still_idx = match still_idx {
                Some(i) => i,
                None => continue, // someone else already split it; retry from the top
            };

            let (lower, upper, depth) = {
                let g = bucket_arc.lock();
                (g.lower, g.upper, g.depth())
            };
            let contains_self = self.self_id >= lower && self.self_id <= upper;
            let eligible = contains_self || (depth % self.b != 0);
            if !eligible {
                // Strict "prefer old": discard the new contact, leave head intact.
                return;
            }

            let (left, right) = bucket_arc.lock().split();
            table_guard.remove(still_idx);
            Self::insert_sorted(&mut table_guard, left);
            Self::insert_sorted(&mut table_guard, right);
            drop(table_guard);
            // Loop: re-locate the correct child and retry the upsert.
        }
    }

    /// Remove a contact by id.
    pub fn remove(&self, id: &Id) -> Result<()> {
        let table_guard = self.buckets.read();
        let idx = Self::bucket_index_for(&table_guard, id).ok_or(Error::NotPresent)?;
        let bucket_arc = table_guard[idx].clone();
        drop(table_guard);
        if bucket_arc.lock().remove(id) {
            Ok(())
        } else {
            Err(Error::NotPresent)
        }
    }

    /// Collect all contacts across all buckets, sorted by XOR-distance to
    /// `target`, ties broken by id order, truncated to `n`.
    pub fn closest(&self, target: &Id, n: usize) -> Vec<Contact> {
        let table_guard = self.buckets.read();
        let mut all: Vec<Contact> = Vec::new();
        for bucket in table_guard.iter() {
            all.extend(bucket.lock().contacts().iter().cloned());
        }
        drop(table_guard);
        all.sort_by(|a, b| {
            target
                .distance(&a.id)
                .cmp(&target.distance(&b.id))
                .then_with(|| a.id.cmp(&b.id))
        });
        all.truncate(n);
        all
    }

    /// All contacts in the table (used by `ADMIN_RT`).
    pub fn dump(&self) -> Vec<Contact> {
        let table_guard = self.buckets.read();
        let mut all = Vec::new();
        for bucket in table_guard.iter() {
            all.extend(bucket.lock().contacts().iter().cloned());
        }
        all
    }

    /// Checkable invariants used by property tests: bucket ranges are
    /// contiguous and exhaustive, no contact id is duplicated, exactly one
    /// bucket contains `self_id`, and every bucket respects its capacity.
    #[cfg(test)]
    fn check_invariants(&self) {
        let table_guard = self.buckets.read();
        assert!(!table_guard.is_empty());

        let mut prev_upper: Option<Id> = None;
        let mut self_containing = 0;
        let mut seen_ids = std::collections::HashSet::new();
        for bucket in table_guard.iter() {
            let guard = bucket.lock();
            if let Some(prev) = prev_upper {
                assert_eq!(prev.add_one(), guard.lower, "bucket ranges must be contiguous");
            } else {
                assert_eq!(guard.lower, Id([0u8; 20]), "first bucket must start at zero");
            }
            prev_upper = Some(guard.upper);
            assert!(guard.len() <= guard.k, "bucket capacity exceeded");
            if guard.contains(&self.self_id) {
                self_containing += 1;
            }
            for c in guard.contacts() {
                assert!(seen_ids.insert(c.id), "duplicate contact id across buckets");
            }
        }
        assert_eq!(prev_upper, Some(Id([0xff; 20])), "last bucket must end at 2^160-1");
        assert_eq!(self_containing, 1, "exactly one bucket must contain self_id");
    }
}
