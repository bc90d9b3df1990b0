// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The bounded, distance-sorted candidate set driving an iterative lookup.

use crate::contact::Contact;
use crate::id::{Distance, Id};

#[derive(Clone)]
struct Entry {
    contact: Contact,
    distance: Distance,
    queried: bool,
}

/// A deduplicated set of the closest-known contacts to a lookup target,
/// kept sorted by ascending distance and capped at `k` entries.
///
/// Mirrors the original implementation's shortlist: every `FIND_NODE` /
/// `FIND_VALUE` reply's contact list is merged in via `add`, which reports
/// whether the closest entry changed so the caller can decide whether
/// another round can possibly make progress.
pub struct Shortlist {
    target: Id,
    k: usize,
    entries: Vec<Entry>,
}

impl Shortlist {
    pub fn new(target: Id, k: usize, seed: Vec<Contact>) -> Self {
        let mut list = Self {
            target,
            k,
            entries: Vec::new(),
        };
        list.add(seed);
        list
    }

    /// Merge in newly-learned contacts, dropping duplicates (by id) and
    /// anything beyond the closest `k`. Returns `true` if the closest
    /// contact in the list changed as a result.
    pub fn add(&mut self, contacts: Vec<Contact>) -> bool {
        let closest_before = self.entries.first().map(|e| e.contact.id);

        for c in contacts {
            if self.entries.iter().any(|e| e.contact.id == c.id) {
                continue;
            }
            let distance = self.target.distance(&c.id);
            self.entries.push(Entry {
                contact: c,
                distance,
                queried: false,
            });
        }
        self.entries.sort_by(|a, b| a.distance.cmp(&b.distance));
        self.entries.truncate(self.k);

        let closest_after = self.entries.first().map(|e| e.contact.id);
        closest_before != closest_after
    }

    /// The next `alpha` unqueried contacts, in ascending distance order,
    /// marked queried so a concurrent round won't re-dispatch them.
    pub fn next_batch(&mut self, alpha: usize) -> Vec<Contact> {
        let mut batch = Vec::with_capacity(alpha);
        for entry in self.entries.iter_mut() {
            if batch.len() == alpha {
                break;
            }
            if !entry.queried {
                entry.queried = true;
                batch.push(entry.contact.clone());
            }
        }
        batch
    }

    /// Whether every entry currently held has already been queried (the
    /// lookup has converged and no round can make further progress).
    pub fn all_queried(&self) -> bool {
        self.entries.iter().all(|e| e.queried)
    }

    /// The current closest-first view, for a final sequential sweep or for
    /// returning results to the caller.
    pub fn contacts(&self) -> Vec<Contact> {
        self.entries.iter().map(|e| e.contact.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_with_first_byte(b: u8) -> Id {
        let mut bytes = [0u8; 20];
        bytes[0] = b;
        Id(bytes)
    }

    #[test]
    fn add_deduplicates_and_caps_at_k() {
        let target = Id([0u8; 20]);
        let mut list = Shortlist::new(target, 2, vec![]);
        let changed = list.add(vec![
            Contact::new(id_with_first_byte(10), "a"),
            Contact::new(id_with_first_byte(20), "b"),
            Contact::new(id_with_first_byte(5), "c"),
        ]);
        assert!(changed);
        assert_eq!(list.contacts().len(), 2);
        // closest two by distance to 0x00... are 0x05.. and 0x0a..
        let ids: Vec<Id> = list.contacts().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![id_with_first_byte(5), id_with_first_byte(10)]);
    }

    #[test]
    fn re_adding_same_contact_does_not_duplicate() {
        let target = Id([0u8; 20]);
        let mut list = Shortlist::new(target, 20, vec![]);
        list.add(vec![Contact::new(id_with_first_byte(1), "a")]);
        list.add(vec![Contact::new(id_with_first_byte(1), "a-again")]);
        assert_eq!(list.contacts().len(), 1);
    }

    #[test]
    fn next_batch_marks_queried_and_does_not_repeat() {
        let target = Id([0u8; 20]);
        let mut list = Shortlist::new(
            target,
            20,
            vec![
                Contact::new(id_with_first_byte(1), "a"),
                Contact::new(id_with_first_byte(2), "b"),
                Contact::new(id_with_first_byte(3), "c"),
            ],
        );
        let batch1 = list.next_batch(2);
        assert_eq!(batch1.len(), 2);
        let batch2 = list.next_batch(2);
        assert_eq!(batch2.len(), 1);
        let batch3 = list.next_batch(2);
        assert!(batch3.is_empty());
        assert!(list.all_queried());
    }

    #[test]
    fn closest_unchanged_reports_false() {
        let target = Id([0u8; 20]);
        let mut list = Shortlist::new(target, 20, vec![Contact::new(id_with_first_byte(1), "a")]);
        let changed = list.add(vec![Contact::new(id_with_first_byte(200), "far")]);
        assert!(!changed);
    }
}
