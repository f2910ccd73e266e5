//! Platform provider contracts, the provider registry, scoped resource
//! ownership, and the in-memory reference providers.
//!
//! The library consumes four interface groups (memory mappings, IPC,
//! network, named synchronization). Their OS implementations live out of
//! tree and are plugged in through [`register`]; the `InMemory` set ships
//! in-crate and backs tests and single-process use.

mod contracts;
mod in_memory;
mod registry;
mod resource;

pub use contracts::{
    mapping_slice, mapping_slice_mut, Access, IpcHandle, IpcProvider, MemoryProvider,
    NetworkProvider, RawMapping, ResourceKind, Sharing, SocketHandle, SocketKind, SocketOption,
    SocketOptionName, SyncHandle, SyncProvider,
};
pub use in_memory::InMemoryProviders;
pub use registry::{providers, providers_for, register, Platform, ProviderSet};
pub use resource::{
    release_all, scoped_mapping, scoped_mutex, scoped_pipe, scoped_semaphore, scoped_socket,
    Scoped, ScopedResource,
};
