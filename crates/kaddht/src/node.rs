// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The node façade: wires the handler bag to the RPC service and drives
//! `PUT`/`GET` at the top level (§4.8).

use crate::bucket::DEFAULT_B;
use crate::contact::Contact;
use crate::error::{Error, Result};
use crate::id::Id;
use crate::lookup::{self, LookupConfig};
use crate::republish;
use crate::routing_table::RoutingTable;
use crate::rpc::{FindValueReply, Handlers, RpcService, DEFAULT_RPC_CAP};
use crate::store::Store;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

/// Overall budget for the populate-then-store walk inside `put`/`bootstrap`.
const LOOKUP_BUDGET: Duration = Duration::from_secs(10);

/// A fully-wired Kademlia node: routing table, value store, RPC service,
/// and the background GC/republisher tasks, sharing one `Transport`.
pub struct Node<T: Transport> {
    self_id: Id,
    routing_table: Arc<RoutingTable>,
    store: Arc<Store>,
    service: Arc<RpcService<T>>,
    cfg: LookupConfig,
    ttl: Duration,
    bootstrap_addrs: Mutex<Vec<String>>,
}

impl<T: Transport + 'static> Node<T> {
    /// Build a node atop `transport`, spawn its reader, GC, and republisher
    /// background tasks, and return it ready to serve traffic.
    ///
    /// `refresh_interval` overrides §4.7's `max(ttl/2, 30s)` default when set
    /// (the CLI's `--refresh` flag).
    pub fn new(
        transport: Arc<T>,
        self_id: Id,
        ttl: Duration,
        cfg: LookupConfig,
        refresh_interval: Option<Duration>,
    ) -> Arc<Self> {
        let routing_table = Arc::new(RoutingTable::with_params(self_id, cfg.k, DEFAULT_B));
        let store = Arc::new(Store::new());
        let node_cell: Arc<OnceLock<Weak<Node<T>>>> = Arc::new(OnceLock::new());

        let handlers = Self::build_handlers(&routing_table, &store, cfg, ttl, node_cell.clone());
        let service = RpcService::new(transport, self_id, handlers);
        service.spawn_reader();
        store.spawn_gc();

        let refresh_interval = refresh_interval.unwrap_or_else(|| republish::default_refresh_interval(ttl));
        republish::spawn(store.clone(), routing_table.clone(), service.clone(), refresh_interval, cfg.k);

        let node = Arc::new(Self {
            self_id,
            routing_table,
            store,
            service,
            cfg,
            ttl,
            bootstrap_addrs: Mutex::new(Vec::new()),
        });
        let _ = node_cell.set(Arc::downgrade(&node));
        node
    }

    fn build_handlers(
        routing_table: &Arc<RoutingTable>,
        store: &Arc<Store>,
        cfg: LookupConfig,
        ttl: Duration,
        node_cell: Arc<OnceLock<Weak<Node<T>>>>,
    ) -> Handlers {
        let rt_seen = routing_table.clone();
        let rt_find_node = routing_table.clone();
        let rt_find_value = routing_table.clone();
        let rt_dump = routing_table.clone();
        let store_find_value = store.clone();
        let store_store = store.clone();
        let store_refresh = store.clone();
        let store_forget = store.clone();
        let node_cell_put = node_cell.clone();
        let node_cell_get = node_cell;

        Handlers {
            on_seen: Some(Arc::new(move |addr, id| {
                rt_seen.update(Contact::new(id, addr));
            })),
            on_find_node: Some(Arc::new(move |target| rt_find_node.closest(&target, cfg.k))),
            on_find_value: Some(Arc::new(move |key| match store_find_value.get(&key) {
                Some(bytes) => FindValueReply::Value(bytes),
                None => FindValueReply::Closer(rt_find_value.closest(&key, cfg.k)),
            })),
            on_store: Some(Arc::new(move |key, value| {
                // Inbound STORE never marks origin: origin is only set by
                // the node that first ran PUT. The replica's lease uses this
                // node's own configured ttl, same as an origin PUT would —
                // REFRESH from the origin (§4.7) is what keeps it alive past
                // that; without it the replica ages out like any other value.
                store_store.put(key, value, ttl, false);
            })),
            on_refresh: Some(Arc::new(move |key| store_refresh.extend_lease(&key))),
            on_admin_put: Some(Arc::new(move |value| {
                let node_cell = node_cell_put.clone();
                Box::pin(async move {
                    match node_cell.get().and_then(Weak::upgrade) {
                        Some(node) => node.put(value).await.unwrap_or(Id::ZERO),
                        None => Id::ZERO,
                    }
                })
            })),
            on_admin_get: Some(Arc::new(move |key, timeout| {
                let node_cell = node_cell_get.clone();
                Box::pin(async move {
                    match node_cell.get().and_then(Weak::upgrade) {
                        Some(node) => node.get_bounded(key, timeout).await.ok(),
                        None => None,
                    }
                })
            })),
            on_admin_forget: Some(Arc::new(move |key| store_forget.forget(&key))),
            on_dump_rt: Some(Arc::new(move || rt_dump.dump())),
            on_exit: Some(Arc::new(|| std::process::exit(0))),
        }
    }

    pub fn self_id(&self) -> Id {
        self.self_id
    }

    pub fn local_addr(&self) -> String {
        self.service.local_addr()
    }

    pub fn routing_table(&self) -> &Arc<RoutingTable> {
        &self.routing_table
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// This node's configured default ttl, applied to both origin `PUT`s and
    /// replica copies accepted via inbound `STORE`.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Best-effort join: ping each seed (ignoring failures) so `on_seen`
    /// populates the routing table, then run one `FIND_NODE` on our own id
    /// to fill neighboring buckets.
    pub async fn bootstrap(&self, seeds: &[String]) {
        *self.bootstrap_addrs.lock() = seeds.to_vec();
        for addr in seeds {
            if let Err(e) = self.service.ping(addr, DEFAULT_RPC_CAP).await {
                log::debug!("bootstrap ping to {addr} failed: {e}");
            }
        }
        let deadline = Instant::now() + LOOKUP_BUDGET;
        let _ = lookup::find_node(&self.service, &self.routing_table, self.self_id, self.cfg, deadline).await;
    }

    /// `PUT(value)`: content-address, populate the routing table around the
    /// key, fan out `STORE` to the `k` closest peers, and keep a local
    /// origin copy for republication.
    pub async fn put(&self, value: Vec<u8>) -> Result<Id> {
        let key = Id::content_hash(&value);

        let deadline = Instant::now() + LOOKUP_BUDGET;
        let _ = lookup::find_node(&self.service, &self.routing_table, key, self.cfg, deadline).await;

        let mut targets = self.routing_table.closest(&key, self.cfg.k);
        if targets.is_empty() {
            if let Some(seed) = self.bootstrap_addrs.lock().first().cloned() {
                let _ = self.service.ping(&seed, DEFAULT_RPC_CAP).await;
                targets = self.routing_table.closest(&key, self.cfg.k);
            }
        }
        if targets.is_empty() {
            self.store.put(key, value, self.ttl, true);
            return Ok(key);
        }

        let mut handles = Vec::with_capacity(targets.len());
        for target in &targets {
            let service = self.service.clone();
            let target = target.clone();
            let value = value.clone();
            handles.push(tokio::spawn(async move {
                service.store(&target.addr, key, &value, DEFAULT_RPC_CAP).await.is_ok()
            }));
        }
        let mut acks = 0usize;
        for h in handles {
            if matches!(h.await, Ok(true)) {
                acks += 1;
            }
        }
        if acks == 0 {
            log::warn!("PUT {key}: no STORE_ACK from any of {} reachable targets", targets.len());
        }

        self.store.put(key, value, self.ttl, true);
        Ok(key)
    }

    /// `GET(key)`: local hit, else the iterative `FIND_VALUE` driver.
    pub async fn get(&self, key: Id) -> Result<Vec<u8>> {
        self.get_bounded(key, LOOKUP_BUDGET).await
    }

    /// `GET` bounded by a caller-supplied timeout — used directly by
    /// `ADMIN_GET`, whose client-supplied `remaining-timeout-ms` must bound
    /// the server's own lookup (§9 open question 3) so a slow responder
    /// can't outlast the client's own deadline.
    ///
    /// The local store is always checked first regardless of which node
    /// the admin client happened to address — the documented ADMIN_GET
    /// "local fast path" (§9 open question 4).
    pub async fn get_bounded(&self, key: Id, timeout: Duration) -> Result<Vec<u8>> {
        if let Some(bytes) = self.store.get(&key) {
            return Ok(bytes);
        }
        let deadline = Instant::now() + timeout;
        match lookup::find_value(&self.service, &self.routing_table, key, self.cfg, deadline).await {
            Ok(bytes) => Ok(bytes),
            Err(_) => Err(Error::NotFound),
        }
    }
}
