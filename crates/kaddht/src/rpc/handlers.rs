// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The handler bag: a capability set the node façade installs once, not a
//! subclass surface. Each field is an optional callback; the service calls
//! whichever are set and treats an absent one as "no-op" (or, for request
//! handlers that must answer, as a locally-empty result).

use crate::contact::Contact;
use crate::id::Id;
use crate::rpc::types::FindValueReply;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A boxed, owned, `Send` future — the shape every async handler returns so
/// the bag can hold them as trait objects without `async fn` in traits.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type OnSeen = Arc<dyn Fn(String, Id) + Send + Sync>;
pub type OnFindNode = Arc<dyn Fn(Id) -> Vec<Contact> + Send + Sync>;
pub type OnFindValue = Arc<dyn Fn(Id) -> FindValueReply + Send + Sync>;
pub type OnStore = Arc<dyn Fn(Id, Vec<u8>) + Send + Sync>;
pub type OnRefresh = Arc<dyn Fn(Id) + Send + Sync>;
pub type OnAdminPut = Arc<dyn Fn(Vec<u8>) -> BoxFuture<Id> + Send + Sync>;
pub type OnAdminGet = Arc<dyn Fn(Id, Duration) -> BoxFuture<Option<Vec<u8>>> + Send + Sync>;
pub type OnAdminForget = Arc<dyn Fn(Id) -> bool + Send + Sync>;
pub type OnDumpRt = Arc<dyn Fn() -> Vec<Contact> + Send + Sync>;
pub type OnExit = Arc<dyn Fn() + Send + Sync>;

/// Callbacks the node layer installs at construction; the RPC service holds
/// this behind an `Arc` and invokes whichever field is set when a matching
/// inbound label arrives.
#[derive(Clone, Default)]
pub struct Handlers {
    pub on_seen: Option<OnSeen>,
    pub on_find_node: Option<OnFindNode>,
    pub on_find_value: Option<OnFindValue>,
    pub on_store: Option<OnStore>,
    pub on_refresh: Option<OnRefresh>,
    pub on_admin_put: Option<OnAdminPut>,
    pub on_admin_get: Option<OnAdminGet>,
    pub on_admin_forget: Option<OnAdminForget>,
    pub on_dump_rt: Option<OnDumpRt>,
    pub on_exit: Option<OnExit>,
}
