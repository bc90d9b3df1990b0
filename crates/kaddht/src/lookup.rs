// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The α-parallel iterative `FIND_NODE` / `FIND_VALUE` lookup drivers.
//!
//! Both drivers share the same skeleton (§4.5): seed a shortlist from the
//! local routing table, repeatedly dispatch a batch of `α` concurrent RPCs,
//! merge replies back into the shortlist and the routing table, and stop on
//! convergence (no new closer contact) or, for `FIND_VALUE`, on an early
//! value hit.
//!
//! Per-round cancellation is a hand-rolled `Arc<Notify>` + `AtomicBool`
//! rather than a `tokio_util::CancellationToken`, mirroring the original
//! implementation's `context.WithCancel(ctx)` plus a buffered `foundValCh`
//! in `put_get.go`'s `GetValue`: the first reply carrying a value flips the
//! flag and wakes the driver; siblings still in flight are left to finish
//! in the background and their results are discarded.

use crate::contact::Contact;
use crate::id::Id;
use crate::routing_table::RoutingTable;
use crate::rpc::{FindValueReply, RpcService, DEFAULT_RPC_CAP};
use crate::shortlist::Shortlist;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Tunables for an iterative lookup; defaults match §4.5 (`α = 3`, `k = 20`).
#[derive(Clone, Copy)]
pub struct LookupConfig {
    pub alpha: usize,
    pub k: usize,
    pub per_rpc_cap: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            alpha: 3,
            k: 20,
            per_rpc_cap: DEFAULT_RPC_CAP,
        }
    }
}

/// A contact is dispatchable if it isn't us, has a non-empty address, and
/// that address has a non-empty host component (§4.5 step 2b).
fn is_routable(self_id: Id, c: &Contact) -> bool {
    if c.id == self_id || c.addr.is_empty() {
        return false;
    }
    match c.addr.rsplit_once(':') {
        Some((host, _)) => !host.is_empty(),
        None => false,
    }
}

fn per_call_deadline(overall_deadline: Instant, cap: Duration) -> Duration {
    overall_deadline
        .saturating_duration_since(Instant::now())
        .min(cap)
}

#[derive(Default)]
struct FindNodeRoundState {
    responded: Vec<Contact>,
    discovered: Vec<Contact>,
}

/// Run one round of `FIND_NODE` against `batch`, merging results as they
/// arrive. No early exit: every dispatched RPC is awaited.
async fn find_node_round<T: Transport + 'static>(
    service: &Arc<RpcService<T>>,
    target: Id,
    batch: Vec<Contact>,
    per_call_deadline: Duration,
) -> FindNodeRoundState {
    let state = Arc::new(Mutex::new(FindNodeRoundState::default()));
    let remaining = Arc::new(AtomicUsize::new(batch.len()));
    let done = Arc::new(Notify::new());

    for contact in batch {
        let service = service.clone();
        let state = state.clone();
        let remaining = remaining.clone();
        let done = done.clone();
        tokio::spawn(async move {
            if let Ok(contacts) = service.find_node(&contact.addr, target, per_call_deadline).await {
                let mut guard = state.lock();
                guard.responded.push(contact);
                guard.discovered.extend(contacts);
            }
            if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                done.notify_one();
            }
        });
    }

    if remaining.load(Ordering::SeqCst) > 0 {
        done.notified().await;
    }

    let guard = state.lock();
    FindNodeRoundState {
        responded: guard.responded.clone(),
        discovered: guard.discovered.clone(),
    }
}

/// Iterative `FIND_NODE`: returns the converged shortlist (closest-first).
pub async fn find_node<T: Transport + 'static>(
    service: &Arc<RpcService<T>>,
    routing_table: &RoutingTable,
    target: Id,
    cfg: LookupConfig,
    overall_deadline: Instant,
) -> Vec<Contact> {
    let self_id = routing_table.self_id();
    let seed = routing_table.closest(&target, cfg.k);
    let mut shortlist = Shortlist::new(target, cfg.k, seed);

    loop {
        let batch: Vec<Contact> = shortlist
            .next_batch(cfg.alpha)
            .into_iter()
            .filter(|c| is_routable(self_id, c))
            .collect();
        if batch.is_empty() {
            break;
        }
        if Instant::now() >= overall_deadline {
            break;
        }

        let deadline = per_call_deadline(overall_deadline, cfg.per_rpc_cap);
        let round = find_node_round(service, target, batch, deadline).await;

        for contact in &round.responded {
            routing_table.update(contact.clone());
        }
        for contact in &round.discovered {
            if is_routable(self_id, contact) {
                routing_table.update(contact.clone());
            }
        }
        let changed = shortlist.add(round.discovered);
        if !changed && shortlist.all_queried() {
            break;
        }
    }

    shortlist.contacts()
}

#[derive(Default)]
struct FindValueRoundState {
    responded: Vec<Contact>,
    discovered: Vec<Contact>,
    value: Option<Vec<u8>>,
}

async fn find_value_round<T: Transport + 'static>(
    service: &Arc<RpcService<T>>,
    key: Id,
    batch: Vec<Contact>,
    per_call_deadline: Duration,
) -> FindValueRoundState {
    let state = Arc::new(Mutex::new(FindValueRoundState::default()));
    let found = Arc::new(AtomicBool::new(false));
    let found_notify = Arc::new(Notify::new());
    let remaining = Arc::new(AtomicUsize::new(batch.len()));
    let done_notify = Arc::new(Notify::new());

    for contact in batch {
        let service = service.clone();
        let state = state.clone();
        let found = found.clone();
        let found_notify = found_notify.clone();
        let remaining = remaining.clone();
        let done_notify = done_notify.clone();
        tokio::spawn(async move {
            if !found.load(Ordering::SeqCst) {
                match service.find_value(&contact.addr, key, per_call_deadline).await {
                    Ok(FindValueReply::Value(bytes)) => {
                        let mut guard = state.lock();
                        guard.responded.push(contact);
                        if guard.value.is_none() {
                            guard.value = Some(bytes);
                        }
                        drop(guard);
                        found.store(true, Ordering::SeqCst);
                        found_notify.notify_one();
                    }
                    Ok(FindValueReply::Closer(contacts)) => {
                        let mut guard = state.lock();
                        guard.responded.push(contact);
                        guard.discovered.extend(contacts);
                    }
                    Err(_) => {}
                }
            }
            if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                done_notify.notify_one();
            }
        });
    }

    if remaining.load(Ordering::SeqCst) > 0 {
        tokio::select! {
            _ = found_notify.notified() => {}
            _ = done_notify.notified() => {}
        }
    }

    let guard = state.lock();
    FindValueRoundState {
        responded: guard.responded.clone(),
        discovered: guard.discovered.clone(),
        value: guard.value.clone(),
    }
}

/// Iterative `FIND_VALUE`: `Ok(bytes)` on a hit, `Err(shortlist)` on miss
/// (the closest-known contacts, for the caller to decide what to do next).
pub async fn find_value<T: Transport + 'static>(
    service: &Arc<RpcService<T>>,
    routing_table: &RoutingTable,
    key: Id,
    cfg: LookupConfig,
    overall_deadline: Instant,
) -> Result<Vec<u8>, Vec<Contact>> {
    let self_id = routing_table.self_id();
    let seed = routing_table.closest(&key, cfg.k);
    let mut shortlist = Shortlist::new(key, cfg.k, seed);

    loop {
        let batch: Vec<Contact> = shortlist
            .next_batch(cfg.alpha)
            .into_iter()
            .filter(|c| is_routable(self_id, c))
            .collect();
        if batch.is_empty() {
            break;
        }
        if Instant::now() >= overall_deadline {
            break;
        }

        let deadline = per_call_deadline(overall_deadline, cfg.per_rpc_cap);
        let round = find_value_round(service, key, batch, deadline).await;

        for contact in &round.responded {
            routing_table.update(contact.clone());
        }
        for contact in &round.discovered {
            if is_routable(self_id, contact) {
                routing_table.update(contact.clone());
            }
        }
        if let Some(value) = round.value {
            return Ok(value);
        }
        let changed = shortlist.add(round.discovered);
        if !changed && shortlist.all_queried() {
            break;
        }
    }

    // Optional final sequential sweep: any contact left unqueried gets one
    // more try before giving up. Not required by §4.5, but a cheap safety
    // net when concurrent rounds exhausted the deadline with stragglers
    // still outstanding.
    for contact in shortlist.contacts() {
        if Instant::now() >= overall_deadline {
            break;
        }
        if !is_routable(self_id, &contact) {
            continue;
        }
        let deadline = per_call_deadline(overall_deadline, cfg.per_rpc_cap);
        if let Ok(FindValueReply::Value(bytes)) = service.find_value(&contact.addr, key, deadline).await {
            routing_table.update(contact);
            return Ok(bytes);
        }
    }

    Err(shortlist.contacts())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routable_rejects_self_and_hostless_addresses() {
        let self_id = Id::random();
        let other = Id::random();
        assert!(!is_routable(self_id, &Contact::new(self_id, "127.0.0.1:9000")));
        assert!(!is_routable(self_id, &Contact::new(other, "")));
        assert!(!is_routable(self_id, &Contact::new(other, ":9000")));
        assert!(is_routable(self_id, &Contact::new(other, "127.0.0.1:9000")));
    }
}
