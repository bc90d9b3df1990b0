// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The periodic republisher: keeps this node's originated values alive by
//! re-sending `REFRESH` to their closest holders (§4.7).

use crate::routing_table::RoutingTable;
use crate::rpc::RpcService;
use crate::store::Store;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Floor on the republish tick, regardless of the configured ttl/2.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Short per-call deadline for `REFRESH` fan-out; republication is
/// best-effort and must not let one slow peer stall the whole pass.
const REFRESH_RPC_DEADLINE: Duration = Duration::from_millis(500);

/// `refresh_interval = max(ttl / 2, 30s)`, the default named in §4.7.
pub fn default_refresh_interval(ttl: Duration) -> Duration {
    (ttl / 2).max(MIN_REFRESH_INTERVAL)
}

/// Spawn the background republish task. Runs until the process exits; there
/// is no handle to stop it early because a node's lifetime is the process's.
pub fn spawn<T: Transport + 'static>(
    store: Arc<Store>,
    routing_table: Arc<RoutingTable>,
    service: Arc<RpcService<T>>,
    refresh_interval: Duration,
    k: usize,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh_interval);
        loop {
            ticker.tick().await;
            run_pass(&store, &routing_table, &service, refresh_interval, k).await;
        }
    });
}

async fn run_pass<T: Transport + 'static>(
    store: &Arc<Store>,
    routing_table: &Arc<RoutingTable>,
    service: &Arc<RpcService<T>>,
    refresh_interval: Duration,
    k: usize,
) {
    let due = store.iter_origin_due(Instant::now(), refresh_interval);
    for key in due {
        let targets = routing_table.closest(&key, k);
        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                // Failures are silent per §7: republication never surfaces
                // an error, a dead replica just won't get refreshed.
                let _ = service.refresh(&target.addr, key, REFRESH_RPC_DEADLINE).await;
            }));
        }
        for h in handles {
            let _ = h.await;
        }
        // last_publish advances regardless of how many REFRESH calls landed.
        store.mark_published(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_interval_floors_at_thirty_seconds() {
        assert_eq!(default_refresh_interval(Duration::from_secs(10)), MIN_REFRESH_INTERVAL);
        assert_eq!(default_refresh_interval(Duration::from_secs(120)), Duration::from_secs(60));
    }
}
