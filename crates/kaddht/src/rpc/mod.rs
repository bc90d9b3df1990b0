// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Request/reply correlation and inbound dispatch over a `Transport`.

mod handlers;
mod service;
mod types;

pub use handlers::{BoxFuture, Handlers};
pub use service::{RpcService, DEFAULT_RPC_CAP};
pub use types::{next_rpc_id, FindValueReply};
