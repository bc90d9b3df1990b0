// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The send/recv interface the core consumes, plus a concrete UDP transport.
//!
//! `kaddht` never opens a socket itself — §1 calls the datagram socket an
//! external collaborator. `Transport` is the seam; `kaddht-node` supplies
//! `UdpTransport`, and tests supply in-process loopback transports.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::net::UdpSocket;

/// A send/recv interface over an unreliable datagram transport.
///
/// Implementations are not required to reassemble fragments: a single
/// `send_to` call must correspond to exactly one `recv_from` on the peer, so
/// that length-prefix-free payloads (`FIND_VALUE_VAL`) round-trip correctly.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `buf` as a single datagram to `addr`.
    async fn send_to(&self, addr: &str, buf: &[u8]) -> Result<()>;

    /// Receive the next datagram, returning its bytes and the sender's
    /// address in the same string form `send_to` expects.
    async fn recv_from(&self) -> Result<(Vec<u8>, String)>;

    /// The address this transport is reachable at, for advertising to peers.
    fn local_addr(&self) -> String;
}

/// A `Transport` backed by a real `tokio::net::UdpSocket`.
pub struct UdpTransport {
    socket: UdpSocket,
    advertised_addr: String,
}

/// Largest single datagram this transport will send or accept, per §6's
/// "MTU-sized frames (≤ 2048 payload bytes recommended)".
pub const MAX_DATAGRAM_LEN: usize = 2048;

impl UdpTransport {
    /// Bind a UDP socket at `bind_addr`. `advertised_addr`, if given, is
    /// what `local_addr()` reports (useful behind NAT); otherwise the bound
    /// local address is used.
    pub async fn bind(bind_addr: &str, advertised_addr: Option<String>) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| Error::BadAddress(format!("{bind_addr}: {e}")))?;
        let advertised_addr = match advertised_addr {
            Some(a) => a,
            None => socket
                .local_addr()
                .map_err(Error::Io)?
                .to_string(),
        };
        Ok(Self {
            socket,
            advertised_addr,
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, addr: &str, buf: &[u8]) -> Result<()> {
        self.socket
            .send_to(buf, addr)
            .await
            .map_err(Error::Io)?;
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, String)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let (len, from) = self.socket.recv_from(&mut buf).await.map_err(Error::Io)?;
        buf.truncate(len);
        Ok((buf, from.to_string()))
    }

    fn local_addr(&self) -> String {
        self.advertised_addr.clone()
    }
}
