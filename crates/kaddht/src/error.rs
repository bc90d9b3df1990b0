// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy shared across the RPC, routing, and storage layers.

use std::fmt;

/// Result type used throughout `kaddht`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by RPC calls, the lookup drivers, and the value store.
#[derive(Debug)]
pub enum Error {
    /// An RPC deadline elapsed before a reply arrived.
    Timeout,

    /// Framing failed: fewer than `21 + label_len` bytes present.
    MalformedFrame,

    /// A label's payload didn't match its expected shape.
    MalformedPayload(String),

    /// A reply's label didn't match the request's expected response.
    UnexpectedReply { expected: &'static str, got: String },

    /// A `STORE` value exceeds the 65,535-byte wire limit.
    PayloadTooLarge { len: usize },

    /// The routing table is empty and no bootstrap address was supplied.
    NoPeers,

    /// `GET` found no peer holding the key.
    NotFound,

    /// `forget` or a routing-table removal targeted an absent entry.
    NotPresent,

    /// The transport rejected an address.
    BadAddress(String),

    /// Underlying transport I/O failure.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "RPC request timed out"),
            Self::MalformedFrame => write!(f, "malformed envelope frame"),
            Self::MalformedPayload(label) => write!(f, "malformed payload for {}", label),
            Self::UnexpectedReply { expected, got } => {
                write!(f, "expected {} reply, got {}", expected, got)
            }
            Self::PayloadTooLarge { len } => {
                write!(f, "value is {} bytes, exceeds 65535-byte STORE limit", len)
            }
            Self::NoPeers => write!(f, "routing table is empty and no bootstrap was supplied"),
            Self::NotFound => write!(f, "key not found"),
            Self::NotPresent => write!(f, "entry not present"),
            Self::BadAddress(addr) => write!(f, "bad address: {}", addr),
            Self::Io(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
