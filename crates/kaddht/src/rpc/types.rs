// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The process-global RPC-id generator and the shared find-value result type.

use crate::contact::Contact;
use crate::id::{Id, ID_LEN};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Outcome of a `FIND_VALUE` RPC, as decoded by the requester or produced by
/// the local `on_find_value` handler: either the value itself, or a closer
/// set of contacts to continue the lookup with.
#[derive(Debug, Clone)]
pub enum FindValueReply {
    Value(Vec<u8>),
    Closer(Vec<Contact>),
}

fn process_prefix() -> &'static [u8; 12] {
    static PREFIX: OnceLock<[u8; 12]> = OnceLock::new();
    PREFIX.get_or_init(|| {
        let mut bytes = [0u8; 12];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        bytes
    })
}

fn counter() -> &'static AtomicU64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    &COUNTER
}

/// Generate a process-unique RPC id: 12 random bytes fixed at first use,
/// followed by an 8-byte big-endian monotonic counter. Two calls within the
/// same process never collide; two calls across processes collide only if
/// both the random prefix and the counter value coincide.
pub fn next_rpc_id() -> Id {
    let prefix = process_prefix();
    let n = counter().fetch_add(1, Ordering::Relaxed);
    let mut bytes = [0u8; ID_LEN];
    bytes[..12].copy_from_slice(prefix);
    bytes[12..].copy_from_slice(&n.to_be_bytes());
    Id(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_under_load() {
        let mut seen = HashSet::new();
        for _ in 0..200_000 {
            assert!(seen.insert(next_rpc_id()));
        }
    }

    #[test]
    fn shares_a_process_wide_prefix() {
        let a = next_rpc_id();
        let b = next_rpc_id();
        assert_eq!(a.as_bytes()[..12], b.as_bytes()[..12]);
        assert_ne!(a, b);
    }
}
