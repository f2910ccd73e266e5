//! Provider contracts consumed by the library. Concrete OS implementations
//! live out of tree; the in-memory providers in this crate are the reference
//! implementation and the test substrate.
//!
//! Every operation returns a `Result`; providers never panic across the
//! boundary. Failures surface as [`BareWireError::Platform`] with the
//! provider's message preserved.
//!
//! [`BareWireError::Platform`]: crate::error::BareWireError::Platform

use std::ptr::NonNull;

use crate::error::{BareWireError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    Private,
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pipe,
    SharedMemory,
    Mutex,
    Semaphore,
}

/// A live memory mapping: an opaque provider handle plus the mapped range.
///
/// The only way to touch the mapped bytes is [`mapping_slice`] /
/// [`mapping_slice_mut`]; everything above this point speaks in slices.
#[derive(Debug)]
pub struct RawMapping {
    pub handle: u64,
    pub addr: NonNull<u8>,
    pub len: usize,
    pub access: Access,
}

/// View a mapping as a bounded byte slice.
///
/// # Safety
///
/// The mapping must still be mapped for the whole lifetime `'m`, and no
/// writer may alias the range during it. For shared mappings, cross-process
/// coordination (e.g. a named mutex) is the caller's responsibility.
pub unsafe fn mapping_slice<'m>(mapping: &'m RawMapping) -> &'m [u8] {
    unsafe { std::slice::from_raw_parts(mapping.addr.as_ptr(), mapping.len) }
}

/// View a mapping as a bounded mutable byte slice. Fails on read-only
/// mappings.
///
/// # Safety
///
/// As [`mapping_slice`], and additionally the range must not be aliased at
/// all during `'m`.
pub unsafe fn mapping_slice_mut<'m>(mapping: &'m mut RawMapping) -> Result<&'m mut [u8]> {
    if mapping.access == Access::ReadOnly {
        return Err(BareWireError::platform("mapping is read-only"));
    }
    Ok(unsafe { std::slice::from_raw_parts_mut(mapping.addr.as_ptr(), mapping.len) })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpcHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncHandle(pub u64);

pub trait MemoryProvider: Send + Sync {
    fn map_anon(&self, size: usize, sharing: Sharing, access: Access) -> Result<RawMapping>;
    fn map_file(&self, path: &str, offset: u64, size: usize, access: Access)
        -> Result<RawMapping>;
    fn unmap(&self, mapping: RawMapping) -> Result<()>;
    fn flush(&self, mapping: &RawMapping, offset: usize, len: usize) -> Result<()>;
    fn lock(&self, mapping: &RawMapping, offset: usize, len: usize) -> Result<()>;
    fn unlock(&self, mapping: &RawMapping, offset: usize, len: usize) -> Result<()>;
}

pub trait IpcProvider: Send + Sync {
    fn pipe_create(&self, name: &str) -> Result<IpcHandle>;
    fn pipe_connect(&self, name: &str) -> Result<IpcHandle>;
    /// Up to `max_len` bytes; empty when nothing is buffered.
    fn pipe_read(&self, pipe: IpcHandle, max_len: usize) -> Result<Vec<u8>>;
    fn pipe_write(&self, pipe: IpcHandle, bytes: &[u8]) -> Result<usize>;
    fn pipe_close(&self, pipe: IpcHandle) -> Result<()>;
    fn shm_create(&self, name: &str, size: usize) -> Result<RawMapping>;
    fn shm_open(&self, name: &str) -> Result<RawMapping>;
    fn shm_close(&self, name: &str, mapping: RawMapping) -> Result<()>;
    fn resource_exists(&self, name: &str, kind: ResourceKind) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
    NoDelay(bool),
    ReceiveTimeoutMs(u64),
    SendBufferSize(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketOptionName {
    NoDelay,
    ReceiveTimeoutMs,
    SendBufferSize,
}

impl SocketOption {
    pub fn name(&self) -> SocketOptionName {
        match self {
            SocketOption::NoDelay(_) => SocketOptionName::NoDelay,
            SocketOption::ReceiveTimeoutMs(_) => SocketOptionName::ReceiveTimeoutMs,
            SocketOption::SendBufferSize(_) => SocketOptionName::SendBufferSize,
        }
    }
}

pub trait NetworkProvider: Send + Sync {
    fn socket_create(&self, kind: SocketKind) -> Result<SocketHandle>;
    fn bind(&self, socket: SocketHandle, address: &str) -> Result<()>;
    fn listen(&self, socket: SocketHandle, backlog: usize) -> Result<()>;
    fn accept(&self, socket: SocketHandle) -> Result<(SocketHandle, String)>;
    fn connect(&self, socket: SocketHandle, address: &str) -> Result<()>;
    fn send(&self, socket: SocketHandle, bytes: &[u8]) -> Result<usize>;
    /// Up to `max_len` bytes; empty when nothing is buffered.
    fn recv(&self, socket: SocketHandle, max_len: usize) -> Result<Vec<u8>>;
    fn close(&self, socket: SocketHandle) -> Result<()>;
    fn set_option(&self, socket: SocketHandle, option: SocketOption) -> Result<()>;
    fn option(&self, socket: SocketHandle, name: SocketOptionName) -> Result<SocketOption>;
    fn resolve(&self, host: &str) -> Result<Vec<String>>;
}

pub trait SyncProvider: Send + Sync {
    fn mutex_create(&self, name: &str) -> Result<SyncHandle>;
    fn mutex_open(&self, name: &str) -> Result<SyncHandle>;
    /// `Ok(true)` when acquired, `Ok(false)` on timeout. `None` waits
    /// indefinitely.
    fn mutex_acquire(&self, mutex: SyncHandle, timeout_ms: Option<u64>) -> Result<bool>;
    fn mutex_release(&self, mutex: SyncHandle) -> Result<()>;
    fn mutex_close(&self, mutex: SyncHandle) -> Result<()>;
    fn semaphore_create(&self, name: &str, initial: u32, max: u32) -> Result<SyncHandle>;
    fn semaphore_open(&self, name: &str) -> Result<SyncHandle>;
    fn semaphore_acquire(&self, semaphore: SyncHandle, timeout_ms: Option<u64>) -> Result<bool>;
    fn semaphore_release(&self, semaphore: SyncHandle, count: u32) -> Result<()>;
    fn semaphore_close(&self, semaphore: SyncHandle) -> Result<()>;
}
