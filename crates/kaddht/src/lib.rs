// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A from-scratch Kademlia DHT: 160-bit XOR routing, α-parallel iterative
//! lookups, and a TTL value store with origin republication, built atop a
//! caller-supplied datagram `Transport`.

pub mod bucket;
pub mod contact;
pub mod envelope;
pub mod error;
pub mod id;
pub mod lookup;
pub mod node;
pub mod republish;
pub mod routing_table;
pub mod rpc;
pub mod shortlist;
pub mod store;
pub mod transport;

pub use contact::Contact;
pub use error::{Error, Result};
pub use id::Id;
pub use lookup::LookupConfig;
pub use node::Node;
pub use routing_table::RoutingTable;
pub use store::Store;
pub use transport::{Transport, UdpTransport};
