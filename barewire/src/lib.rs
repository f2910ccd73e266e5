//! BAREWire: describe, encode, decode and access binary records in the BARE
//! wire format, and exchange them across process boundaries.
//!
//! The data plane is schema-driven end to end: a validated [`Schema`] drives
//! the [`codec`], the zero-copy [`MemoryView`], and the framed
//! [`MessageChannel`]/[`RpcClient`] protocol over any [`Transport`].
//! Platform specifics (mappings, pipes, sockets, named synchronization) sit
//! behind the [`platform`] provider contracts.

mod bytes;
mod error;
mod frame;
mod transport;
mod view;

pub mod codec;
pub mod platform;
pub mod protocol;
pub mod schema;

#[cfg(test)]
mod e2e_tests;

pub use bytes::{BytesReader, BytesWriter};
pub use error::{BareWireError, Result};
pub use frame::{Frame, FrameFlags, MessageType, FIXED_HEADER_LEN, PROTOCOL_VERSION};
pub use transport::{InMemoryTransport, StreamReassembler, Transport};
pub use view::{FieldPath, IndexedField, MemorySlice, MemoryView};

pub use codec::{MapKey, MapValue, Value};
pub use protocol::{MessageChannel, RpcClient, RpcConfig};
pub use schema::{Schema, StructField, Type};
