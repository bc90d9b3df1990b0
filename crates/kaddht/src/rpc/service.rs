// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The RPC service: correlates outgoing requests with incoming replies over
//! a single `Transport`, and dispatches inbound requests to the installed
//! `Handlers`.
//!
//! Grounded on `original_source/kademlia/service/service.go`'s `Service`
//! (one socket, one waiter map, a label switch) and on the concurrency
//! shape of `hdds::rpc::client::ServiceClient` / `rpc::server::ServiceServer`
//! (a `DashMap` waiter table, a single background reader task, request
//! dispatch onto its own task so a slow handler can't stall the reader).

use crate::contact::Contact;
use crate::envelope::{
    decode_admin_get_request, decode_contacts, decode_store_payload, encode_admin_get_request,
    encode_contacts, encode_store_payload, Envelope, Label,
};
use crate::error::{Error, Result};
use crate::id::{Id, ID_LEN};
use crate::rpc::handlers::Handlers;
use crate::rpc::types::{next_rpc_id, FindValueReply};
use crate::transport::Transport;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Default per-RPC deadline cap used by the lookup driver; see §4.5's
/// `min(remaining, 1.1s)`.
pub const DEFAULT_RPC_CAP: Duration = Duration::from_millis(1100);

pub struct RpcService<T: Transport> {
    transport: Arc<T>,
    self_id: Id,
    waiters: DashMap<Id, oneshot::Sender<Envelope>>,
    handlers: Handlers,
}

impl<T: Transport + 'static> RpcService<T> {
    pub fn new(transport: Arc<T>, self_id: Id, handlers: Handlers) -> Arc<Self> {
        Arc::new(Self {
            transport,
            self_id,
            waiters: DashMap::new(),
            handlers,
        })
    }

    pub fn local_addr(&self) -> String {
        self.transport.local_addr()
    }

    /// Start the background reader task. The task runs until the transport
    /// returns an error (e.g. the socket is dropped).
    pub fn spawn_reader(self: &Arc<Self>) {
        let service = self.clone();
        tokio::spawn(async move {
            loop {
                match service.transport.recv_from().await {
                    Ok((buf, from)) => service.clone().on_packet(buf, from),
                    Err(e) => {
                        log::warn!("rpc reader stopping: {e}");
                        break;
                    }
                }
            }
        });
    }

    fn on_packet(self: Arc<Self>, buf: Vec<u8>, from: String) {
        let env = match Envelope::decode(&buf) {
            Ok(env) => env,
            Err(e) => {
                log::debug!("dropping malformed packet from {from}: {e}");
                return;
            }
        };
        if Self::is_reply_label(env.label) {
            self.deliver_reply(env, from);
        } else {
            tokio::spawn(async move { self.handle_request(env, from).await });
        }
    }

    fn is_reply_label(label: Label) -> bool {
        matches!(
            label,
            Label::Pong
                | Label::FindNodeResp
                | Label::FindValueVal
                | Label::FindValueCont
                | Label::StoreAck
                | Label::RefreshAck
                | Label::AdminPutResp
                | Label::AdminGetVal
                | Label::AdminGetNotfound
                | Label::AdminForgetOk
                | Label::AdminRtResp
                | Label::AdminExitOk
        )
    }

    fn deliver_reply(&self, env: Envelope, from: String) {
        if env.label == Label::Pong {
            self.note_peer_id_in_payload(&from, &env.payload);
        }
        if let Some((_, tx)) = self.waiters.remove(&env.rpc_id) {
            // A dropped receiver means the caller already gave up; ignore.
            let _ = tx.send(env);
        }
    }

    fn note_peer_id_in_payload(&self, addr: &str, payload: &[u8]) {
        if payload.len() < ID_LEN {
            return;
        }
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&payload[..ID_LEN]);
        if let Some(on_seen) = &self.handlers.on_seen {
            on_seen(addr.to_string(), Id(id));
        }
    }

    async fn handle_request(self: Arc<Self>, env: Envelope, from: String) {
        let rpc_id = env.rpc_id;
        let reply = match env.label {
            Label::Ping => {
                self.note_peer_id_in_payload(&from, &env.payload);
                Some((Label::Pong, self.self_id.as_bytes().to_vec()))
            }
            Label::FindNode => {
                if env.payload.len() < ID_LEN {
                    log::debug!("FIND_NODE from {from}: short payload");
                    return;
                }
                let mut target = [0u8; ID_LEN];
                target.copy_from_slice(&env.payload[..ID_LEN]);
                let contacts = match &self.handlers.on_find_node {
                    Some(f) => f(Id(target)),
                    None => Vec::new(),
                };
                Some((Label::FindNodeResp, encode_contacts(&contacts)))
            }
            Label::FindValue => {
                if env.payload.len() < ID_LEN {
                    log::debug!("FIND_VALUE from {from}: short payload");
                    return;
                }
                let mut key = [0u8; ID_LEN];
                key.copy_from_slice(&env.payload[..ID_LEN]);
                match &self.handlers.on_find_value {
                    Some(f) => match f(Id(key)) {
                        FindValueReply::Value(bytes) => Some((Label::FindValueVal, bytes)),
                        FindValueReply::Closer(contacts) => {
                            Some((Label::FindValueCont, encode_contacts(&contacts)))
                        }
                    },
                    None => Some((Label::FindValueCont, encode_contacts(&[]))),
                }
            }
            Label::Store => match decode_store_payload(&env.payload) {
                Ok((key, value)) => {
                    if let Some(f) = &self.handlers.on_store {
                        f(key, value);
                    }
                    Some((Label::StoreAck, Vec::new()))
                }
                Err(e) => {
                    log::debug!("STORE from {from}: {e}");
                    None
                }
            },
            Label::Refresh => {
                if env.payload.len() < ID_LEN {
                    log::debug!("REFRESH from {from}: short payload");
                    return;
                }
                let mut key = [0u8; ID_LEN];
                key.copy_from_slice(&env.payload[..ID_LEN]);
                if let Some(f) = &self.handlers.on_refresh {
                    f(Id(key));
                }
                Some((Label::RefreshAck, Vec::new()))
            }
            Label::AdminPut => {
                let reply_label_payload = match &self.handlers.on_admin_put {
                    Some(f) => {
                        let key = f(env.payload.clone()).await;
                        (Label::AdminPutResp, key.as_bytes().to_vec())
                    }
                    None => (Label::AdminPutResp, Vec::new()),
                };
                Some(reply_label_payload)
            }
            Label::AdminGet => match decode_admin_get_request(&env.payload) {
                Ok((key, ms)) => match &self.handlers.on_admin_get {
                    Some(f) => match f(key, Duration::from_millis(ms as u64)).await {
                        Some(value) => Some((Label::AdminGetVal, value)),
                        None => Some((Label::AdminGetNotfound, Vec::new())),
                    },
                    None => Some((Label::AdminGetNotfound, Vec::new())),
                },
                Err(e) => {
                    log::debug!("ADMIN_GET from {from}: {e}");
                    None
                }
            },
            Label::AdminForget => {
                if env.payload.len() < ID_LEN {
                    log::debug!("ADMIN_FORGET from {from}: short payload");
                    return;
                }
                let mut key = [0u8; ID_LEN];
                key.copy_from_slice(&env.payload[..ID_LEN]);
                let existed = match &self.handlers.on_admin_forget {
                    Some(f) => f(Id(key)),
                    None => false,
                };
                Some((Label::AdminForgetOk, vec![existed as u8]))
            }
            Label::AdminRt => {
                let contacts = match &self.handlers.on_dump_rt {
                    Some(f) => f(),
                    None => Vec::new(),
                };
                Some((Label::AdminRtResp, encode_contacts(&contacts)))
            }
            Label::AdminExit => Some((Label::AdminExitOk, Vec::new())),
            other => {
                log::debug!("unexpected inbound label {:?} from {from}", other);
                None
            }
        };

        if let Some((label, payload)) = reply {
            let out = Envelope::new(rpc_id, label, payload).encode();
            if let Err(e) = self.transport.send_to(&from, &out).await {
                log::debug!("failed to reply to {from}: {e}");
            }
        }

        if env.label == Label::AdminExit {
            if let Some(f) = &self.handlers.on_exit {
                f();
            }
        }
    }

    async fn send_and_wait(&self, to: &str, label: Label, payload: Vec<u8>, deadline: Duration) -> Result<Envelope> {
        let rpc_id = next_rpc_id();
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(rpc_id, tx);

        let out = Envelope::new(rpc_id, label, payload).encode();
        if let Err(e) = self.transport.send_to(to, &out).await {
            self.waiters.remove(&rpc_id);
            return Err(e);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                self.waiters.remove(&rpc_id);
                Err(Error::Timeout)
            }
            Err(_) => {
                self.waiters.remove(&rpc_id);
                Err(Error::Timeout)
            }
        }
    }

    fn expect(reply: Envelope, expected: Label, name: &'static str) -> Result<Envelope> {
        if reply.label != expected {
            return Err(Error::UnexpectedReply {
                expected: name,
                got: reply.label.as_str().to_string(),
            });
        }
        Ok(reply)
    }

    pub async fn ping(&self, to: &str, deadline: Duration) -> Result<()> {
        let reply = self
            .send_and_wait(to, Label::Ping, self.self_id.as_bytes().to_vec(), deadline)
            .await?;
        Self::expect(reply, Label::Pong, "PONG")?;
        Ok(())
    }

    pub async fn find_node(&self, to: &str, target: Id, deadline: Duration) -> Result<Vec<Contact>> {
        let reply = self
            .send_and_wait(to, Label::FindNode, target.as_bytes().to_vec(), deadline)
            .await?;
        let reply = Self::expect(reply, Label::FindNodeResp, "FIND_NODE_RESP")?;
        decode_contacts(&reply.payload)
    }

    pub async fn find_value(&self, to: &str, key: Id, deadline: Duration) -> Result<FindValueReply> {
        let reply = self
            .send_and_wait(to, Label::FindValue, key.as_bytes().to_vec(), deadline)
            .await?;
        match reply.label {
            Label::FindValueVal => Ok(FindValueReply::Value(reply.payload)),
            Label::FindValueCont => Ok(FindValueReply::Closer(decode_contacts(&reply.payload)?)),
            other => Err(Error::UnexpectedReply {
                expected: "FIND_VALUE_VAL or FIND_VALUE_CONT",
                got: other.as_str().to_string(),
            }),
        }
    }

    pub async fn store(&self, to: &str, key: Id, value: &[u8], deadline: Duration) -> Result<()> {
        let payload = encode_store_payload(&key, value)?;
        let reply = self.send_and_wait(to, Label::Store, payload, deadline).await?;
        Self::expect(reply, Label::StoreAck, "STORE_ACK")?;
        Ok(())
    }

    pub async fn refresh(&self, to: &str, key: Id, deadline: Duration) -> Result<()> {
        let reply = self
            .send_and_wait(to, Label::Refresh, key.as_bytes().to_vec(), deadline)
            .await?;
        Self::expect(reply, Label::RefreshAck, "REFRESH_ACK")?;
        Ok(())
    }

    pub async fn admin_put(&self, to: &str, value: &[u8], deadline: Duration) -> Result<Id> {
        let reply = self
            .send_and_wait(to, Label::AdminPut, value.to_vec(), deadline)
            .await?;
        let reply = Self::expect(reply, Label::AdminPutResp, "ADMIN_PUT_RESP")?;
        if reply.payload.len() != ID_LEN {
            return Err(Error::MalformedPayload("ADMIN_PUT_RESP".into()));
        }
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&reply.payload);
        Ok(Id(id))
    }

    pub async fn admin_get(&self, to: &str, key: Id, deadline: Duration) -> Result<Option<Vec<u8>>> {
        let payload = encode_admin_get_request(&key, deadline.as_millis() as u32);
        let reply = self.send_and_wait(to, Label::AdminGet, payload, deadline).await?;
        match reply.label {
            Label::AdminGetVal => Ok(Some(reply.payload)),
            Label::AdminGetNotfound => Ok(None),
            other => Err(Error::UnexpectedReply {
                expected: "ADMIN_GET_VAL or ADMIN_GET_NOTFOUND",
                got: other.as_str().to_string(),
            }),
        }
    }

    pub async fn admin_forget(&self, to: &str, key: Id, deadline: Duration) -> Result<bool> {
        let reply = self
            .send_and_wait(to, Label::AdminForget, key.as_bytes().to_vec(), deadline)
            .await?;
        let reply = Self::expect(reply, Label::AdminForgetOk, "ADMIN_FORGET_OK")?;
        Ok(reply.payload.first().copied().unwrap_or(0) != 0)
    }

    pub async fn admin_rt(&self, to: &str, deadline: Duration) -> Result<Vec<Contact>> {
        let reply = self.send_and_wait(to, Label::AdminRt, Vec::new(), deadline).await?;
        let reply = Self::expect(reply, Label::AdminRtResp, "ADMIN_RT_RESP")?;
        decode_contacts(&reply.payload)
    }

    pub async fn admin_exit(&self, to: &str, deadline: Duration) -> Result<()> {
        let reply = self.send_and_wait(to, Label::AdminExit, Vec::new(), deadline).await?;
        Self::expect(reply, Label::AdminExitOk, "ADMIN_EXIT_OK")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::handlers::Handlers;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::net::UdpSocket;

    struct LoopbackTransport(UdpSocket, String);

    #[async_trait::async_trait]
    impl Transport for LoopbackTransport {
        async fn send_to(&self, addr: &str, buf: &[u8]) -> Result<()> {
            self.0.send_to(buf, addr).await.map_err(Error::Io)?;
            Ok(())
        }
        async fn recv_from(&self) -> Result<(Vec<u8>, String)> {
            let mut buf = vec![0u8; 2048];
            let (n, from) = self.0.recv_from(&mut buf).await.map_err(Error::Io)?;
            buf.truncate(n);
            Ok((buf, from.to_string()))
        }
        fn local_addr(&self) -> String {
            self.1.clone()
        }
    }

    async fn make_loopback() -> Arc<LoopbackTransport> {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        Arc::new(LoopbackTransport(socket, addr))
    }

    #[tokio::test]
    async fn ping_pong_round_trip() {
        let t_a = make_loopback().await;
        let t_b = make_loopback().await;
        let addr_b = t_b.local_addr();

        let svc_a = RpcService::new(t_a, Id::random(), Handlers::default());
        let svc_b = RpcService::new(t_b, Id::random(), Handlers::default());
        svc_a.spawn_reader();
        svc_b.spawn_reader();

        svc_a.ping(&addr_b, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn find_node_invokes_handler_and_replies_with_contacts() {
        let t_a = make_loopback().await;
        let t_b = make_loopback().await;
        let addr_b = t_b.local_addr();

        let known = Contact::new(Id::random(), "127.0.0.1:1");
        let known_clone = known.clone();
        let mut handlers_b = Handlers::default();
        handlers_b.on_find_node = Some(Arc::new(move |_target| vec![known_clone.clone()]));

        let svc_a = RpcService::new(t_a, Id::random(), Handlers::default());
        let svc_b = RpcService::new(t_b, Id::random(), handlers_b);
        svc_a.spawn_reader();
        svc_b.spawn_reader();

        let contacts = svc_a
            .find_node(&addr_b, Id::random(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, known.id);
    }

    #[tokio::test]
    async fn timeout_when_no_responder() {
        let t_a = make_loopback().await;
        let svc_a = RpcService::new(t_a, Id::random(), Handlers::default());
        svc_a.spawn_reader();
        let result = svc_a
            .ping("127.0.0.1:1", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn admin_exit_calls_handler_after_reply_sent() {
        let t_a = make_loopback().await;
        let t_b = make_loopback().await;
        let addr_b = t_b.local_addr();

        let exited = Arc::new(AtomicBool::new(false));
        let exited_clone = exited.clone();
        let mut handlers_b = Handlers::default();
        handlers_b.on_exit = Some(Arc::new(move || exited_clone.store(true, Ordering::SeqCst)));

        let svc_a = RpcService::new(t_a, Id::random(), Handlers::default());
        let svc_b = RpcService::new(t_b, Id::random(), handlers_b);
        svc_a.spawn_reader();
        svc_b.spawn_reader();

        svc_a.admin_exit(&addr_b, Duration::from_secs(1)).await.unwrap();
        assert!(exited.load(Ordering::SeqCst));
    }
}
