//! Typed message exchange layered on the codec, frames and a transport.

mod channel;
mod rpc;

pub use channel::{MessageChannel, SCHEMA_ID_HEADER};
pub use rpc::{RpcClient, RpcConfig, METHOD_HEADER};
