//! The `InMemory` provider set: every platform contract implemented with
//! process-local structures. Registered by default, used by tests, and the
//! reference for out-of-tree OS providers.
//!
//! Simplifications relative to OS providers, by design:
//! - pipe and socket reads are non-blocking (empty result when idle),
//! - `accept` fails instead of blocking when nothing is pending,
//! - the loopback byte stream does not preserve datagram boundaries,
//! - named mutexes are not reentrant.

use std::collections::{HashMap, VecDeque};
use std::io::{Seek, SeekFrom, Write};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{BareWireError, Result};
use crate::platform::contracts::{
    mapping_slice, Access, IpcHandle, IpcProvider, MemoryProvider, NetworkProvider, RawMapping,
    ResourceKind, Sharing, SocketHandle, SocketKind, SocketOption, SocketOptionName, SyncHandle,
    SyncProvider,
};

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One struct implements all four provider contracts over shared registries.
#[derive(Default)]
pub struct InMemoryProviders {
    state: Mutex<State>,
    next_handle: AtomicU64,
}

#[derive(Default)]
struct State {
    mappings: HashMap<u64, MappingEntry>,
    shm: HashMap<String, ShmEntry>,
    pipes: HashMap<String, Arc<PipeShared>>,
    pipe_ends: HashMap<u64, PipeEnd>,
    sockets: HashMap<u64, SocketEntry>,
    listeners: HashMap<String, Listener>,
    mutexes: HashMap<String, NamedEntry<NamedMutex>>,
    semaphores: HashMap<String, NamedEntry<NamedSemaphore>>,
    sync_handles: HashMap<u64, SyncObject>,
}

struct MappingEntry {
    addr: usize,
    len: usize,
    backing: MappingBacking,
}

enum MappingBacking {
    Anonymous,
    File { path: String, offset: u64 },
    Shared { name: String },
}

struct ShmEntry {
    addr: usize,
    len: usize,
    refs: usize,
}

#[derive(Default)]
struct PipeShared {
    to_server: Mutex<VecDeque<u8>>,
    to_client: Mutex<VecDeque<u8>>,
}

struct PipeEnd {
    name: String,
    shared: Arc<PipeShared>,
    is_server: bool,
}

#[derive(Default)]
struct Conn {
    to_acceptor: Mutex<VecDeque<u8>>,
    to_connector: Mutex<VecDeque<u8>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Connector,
    Acceptor,
}

struct SocketEntry {
    #[allow(dead_code)]
    kind: SocketKind,
    bound: Option<String>,
    conn: Option<(Arc<Conn>, Side)>,
    options: HashMap<SocketOptionName, SocketOption>,
}

struct Listener {
    backlog: usize,
    pending: VecDeque<(Arc<Conn>, String)>,
}

struct NamedEntry<O> {
    object: Arc<O>,
    refs: usize,
}

#[derive(Default)]
struct NamedMutex {
    locked: Mutex<bool>,
    cv: Condvar,
}

struct NamedSemaphore {
    count: Mutex<u32>,
    max: u32,
    cv: Condvar,
}

enum SyncObject {
    Mutex { name: String, object: Arc<NamedMutex> },
    Semaphore {
        name: String,
        object: Arc<NamedSemaphore>,
    },
}

fn allocate(size: usize) -> usize {
    let boxed: Box<[u8]> = vec![0u8; size].into_boxed_slice();
    Box::into_raw(boxed) as *mut u8 as usize
}

/// # Safety
/// `addr`/`len` must come from [`allocate`] and not have been freed yet.
unsafe fn free(addr: usize, len: usize) {
    let ptr = std::ptr::slice_from_raw_parts_mut(addr as *mut u8, len);
    drop(unsafe { Box::from_raw(ptr) });
}

impl InMemoryProviders {
    pub fn new() -> InMemoryProviders {
        InMemoryProviders::default()
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock_unpoisoned(&self.state)
    }

    fn mapping_from(&self, addr: usize, len: usize, access: Access) -> Result<RawMapping> {
        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| BareWireError::platform("mapping has a null address"))?;
        Ok(RawMapping {
            handle: 0, // patched by the caller
            addr: ptr,
            len,
            access,
        })
    }
}

impl MemoryProvider for InMemoryProviders {
    fn map_anon(&self, size: usize, _sharing: Sharing, access: Access) -> Result<RawMapping> {
        let addr = allocate(size);
        let handle = self.next();
        self.state().mappings.insert(
            handle,
            MappingEntry {
                addr,
                len: size,
                backing: MappingBacking::Anonymous,
            },
        );
        let mut mapping = self.mapping_from(addr, size, access)?;
        mapping.handle = handle;
        Ok(mapping)
    }

    fn map_file(
        &self,
        path: &str,
        offset: u64,
        size: usize,
        access: Access,
    ) -> Result<RawMapping> {
        let contents = std::fs::read(path)
            .map_err(|err| BareWireError::platform(format!("cannot map `{path}`: {err}")))?;
        let start = usize::try_from(offset)
            .map_err(|_| BareWireError::platform("file offset exceeds address space"))?;
        let addr = allocate(size);
        // Copy what the file provides; the rest of the region stays zeroed.
        if start < contents.len() {
            let available = (contents.len() - start).min(size);
            // The region was just allocated and nothing else can reference
            // it yet.
            unsafe {
                std::slice::from_raw_parts_mut(addr as *mut u8, size)[..available]
                    .copy_from_slice(&contents[start..start + available]);
            }
        }
        let handle = self.next();
        self.state().mappings.insert(
            handle,
            MappingEntry {
                addr,
                len: size,
                backing: MappingBacking::File {
                    path: path.to_string(),
                    offset,
                },
            },
        );
        let mut mapping = self.mapping_from(addr, size, access)?;
        mapping.handle = handle;
        Ok(mapping)
    }

    fn unmap(&self, mapping: RawMapping) -> Result<()> {
        let mut state = self.state();
        let entry = state
            .mappings
            .remove(&mapping.handle)
            .ok_or_else(|| BareWireError::platform("unknown mapping handle"))?;
        match entry.backing {
            MappingBacking::Anonymous | MappingBacking::File { .. } => {
                // Last reference to the allocation.
                unsafe { free(entry.addr, entry.len) };
            }
            MappingBacking::Shared { name } => {
                release_shared(&mut state, &name)?;
            }
        }
        Ok(())
    }

    fn flush(&self, mapping: &RawMapping, offset: usize, len: usize) -> Result<()> {
        let state = self.state();
        let entry = state
            .mappings
            .get(&mapping.handle)
            .ok_or_else(|| BareWireError::platform("unknown mapping handle"))?;
        check_mapped_range(entry, offset, len)?;
        if let MappingBacking::File {
            path,
            offset: file_offset,
        } = &entry.backing
        {
            if mapping.access == Access::ReadWrite {
                let mut file = std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .open(path)
                    .map_err(|err| {
                        BareWireError::platform(format!("cannot flush `{path}`: {err}"))
                    })?;
                // The mapping is live: its registry entry is held above.
                let bytes = unsafe { mapping_slice(mapping) };
                file.seek(SeekFrom::Start(file_offset + offset as u64))
                    .and_then(|_| file.write_all(&bytes[offset..offset + len]))
                    .map_err(|err| {
                        BareWireError::platform(format!("cannot flush `{path}`: {err}"))
                    })?;
            }
        }
        Ok(())
    }

    fn lock(&self, mapping: &RawMapping, offset: usize, len: usize) -> Result<()> {
        let state = self.state();
        let entry = state
            .mappings
            .get(&mapping.handle)
            .ok_or_else(|| BareWireError::platform("unknown mapping handle"))?;
        check_mapped_range(entry, offset, len)
    }

    fn unlock(&self, mapping: &RawMapping, offset: usize, len: usize) -> Result<()> {
        self.lock(mapping, offset, len)
    }
}

fn check_mapped_range(entry: &MappingEntry, offset: usize, len: usize) -> Result<()> {
    let fits = offset
        .checked_add(len)
        .is_some_and(|end| end <= entry.len);
    if !fits {
        return Err(BareWireError::OutOfBounds {
            offset,
            length: len,
        });
    }
    Ok(())
}

fn release_shared(state: &mut State, name: &str) -> Result<()> {
    let Some(entry) = state.shm.get_mut(name) else {
        return Err(BareWireError::platform(format!(
            "unknown shared memory `{name}`"
        )));
    };
    entry.refs -= 1;
    if entry.refs > 0 {
        return Ok(());
    }
    if let Some(entry) = state.shm.remove(name) {
        // All handles are gone.
        unsafe { free(entry.addr, entry.len) };
    }
    Ok(())
}

impl IpcProvider for InMemoryProviders {
    fn pipe_create(&self, name: &str) -> Result<IpcHandle> {
        let mut state = self.state();
        if state.pipes.contains_key(name) {
            return Err(BareWireError::platform(format!(
                "pipe `{name}` already exists"
            )));
        }
        let shared = Arc::new(PipeShared::default());
        state.pipes.insert(name.to_string(), Arc::clone(&shared));
        let handle = self.next();
        state.pipe_ends.insert(
            handle,
            PipeEnd {
                name: name.to_string(),
                shared,
                is_server: true,
            },
        );
        Ok(IpcHandle(handle))
    }

    fn pipe_connect(&self, name: &str) -> Result<IpcHandle> {
        let mut state = self.state();
        let shared = state
            .pipes
            .get(name)
            .cloned()
            .ok_or_else(|| BareWireError::platform(format!("pipe `{name}` does not exist")))?;
        let handle = self.next();
        state.pipe_ends.insert(
            handle,
            PipeEnd {
                name: name.to_string(),
                shared,
                is_server: false,
            },
        );
        Ok(IpcHandle(handle))
    }

    fn pipe_read(&self, pipe: IpcHandle, max_len: usize) -> Result<Vec<u8>> {
        let (shared, is_server) = {
            let state = self.state();
            let end = state
                .pipe_ends
                .get(&pipe.0)
                .ok_or_else(|| BareWireError::platform("unknown pipe handle"))?;
            (Arc::clone(&end.shared), end.is_server)
        };
        let queue = if is_server {
            &shared.to_server
        } else {
            &shared.to_client
        };
        let mut queue = lock_unpoisoned(queue);
        let take = max_len.min(queue.len());
        Ok(queue.drain(..take).collect())
    }

    fn pipe_write(&self, pipe: IpcHandle, bytes: &[u8]) -> Result<usize> {
        let (shared, is_server) = {
            let state = self.state();
            let end = state
                .pipe_ends
                .get(&pipe.0)
                .ok_or_else(|| BareWireError::platform("unknown pipe handle"))?;
            (Arc::clone(&end.shared), end.is_server)
        };
        let queue = if is_server {
            &shared.to_client
        } else {
            &shared.to_server
        };
        lock_unpoisoned(queue).extend(bytes.iter().copied());
        Ok(bytes.len())
    }

    fn pipe_close(&self, pipe: IpcHandle) -> Result<()> {
        let mut state = self.state();
        let end = state
            .pipe_ends
            .remove(&pipe.0)
            .ok_or_else(|| BareWireError::platform("unknown pipe handle"))?;
        if end.is_server {
            state.pipes.remove(&end.name);
        }
        Ok(())
    }

    fn shm_create(&self, name: &str, size: usize) -> Result<RawMapping> {
        let mut state = self.state();
        if state.shm.contains_key(name) {
            return Err(BareWireError::platform(format!(
                "shared memory `{name}` already exists"
            )));
        }
        let addr = allocate(size);
        state.shm.insert(
            name.to_string(),
            ShmEntry {
                addr,
                len: size,
                refs: 1,
            },
        );
        let handle = self.next();
        state.mappings.insert(
            handle,
            MappingEntry {
                addr,
                len: size,
                backing: MappingBacking::Shared {
                    name: name.to_string(),
                },
            },
        );
        drop(state);
        let mut mapping = self.mapping_from(addr, size, Access::ReadWrite)?;
        mapping.handle = handle;
        Ok(mapping)
    }

    fn shm_open(&self, name: &str) -> Result<RawMapping> {
        let mut state = self.state();
        let (addr, len) = {
            let entry = state.shm.get_mut(name).ok_or_else(|| {
                BareWireError::platform(format!("shared memory `{name}` does not exist"))
            })?;
            entry.refs += 1;
            (entry.addr, entry.len)
        };
        let handle = self.next();
        state.mappings.insert(
            handle,
            MappingEntry {
                addr,
                len,
                backing: MappingBacking::Shared {
                    name: name.to_string(),
                },
            },
        );
        drop(state);
        let mut mapping = self.mapping_from(addr, len, Access::ReadWrite)?;
        mapping.handle = handle;
        Ok(mapping)
    }

    fn shm_close(&self, name: &str, mapping: RawMapping) -> Result<()> {
        let mut state = self.state();
        let entry = state
            .mappings
            .remove(&mapping.handle)
            .ok_or_else(|| BareWireError::platform("unknown mapping handle"))?;
        match entry.backing {
            MappingBacking::Shared { name: entry_name } if entry_name == name => {
                release_shared(&mut state, name)
            }
            other => {
                // Not a handle for this name after all; put it back.
                state.mappings.insert(
                    mapping.handle,
                    MappingEntry {
                        backing: other,
                        ..entry
                    },
                );
                Err(BareWireError::platform(format!(
                    "mapping does not belong to shared memory `{name}`"
                )))
            }
        }
    }

    fn resource_exists(&self, name: &str, kind: ResourceKind) -> bool {
        let state = self.state();
        match kind {
            ResourceKind::Pipe => state.pipes.contains_key(name),
            ResourceKind::SharedMemory => state.shm.contains_key(name),
            ResourceKind::Mutex => state.mutexes.contains_key(name),
            ResourceKind::Semaphore => state.semaphores.contains_key(name),
        }
    }
}

impl NetworkProvider for InMemoryProviders {
    fn socket_create(&self, kind: SocketKind) -> Result<SocketHandle> {
        let handle = self.next();
        self.state().sockets.insert(
            handle,
            SocketEntry {
                kind,
                bound: None,
                conn: None,
                options: HashMap::new(),
            },
        );
        Ok(SocketHandle(handle))
    }

    fn bind(&self, socket: SocketHandle, address: &str) -> Result<()> {
        let mut state = self.state();
        if state.listeners.contains_key(address) {
            return Err(BareWireError::platform(format!(
                "address `{address}` is already bound"
            )));
        }
        let entry = socket_entry(&mut state, socket)?;
        entry.bound = Some(address.to_string());
        Ok(())
    }

    fn listen(&self, socket: SocketHandle, backlog: usize) -> Result<()> {
        let mut state = self.state();
        let address = socket_entry(&mut state, socket)?
            .bound
            .clone()
            .ok_or_else(|| BareWireError::platform("socket is not bound"))?;
        state.listeners.insert(
            address,
            Listener {
                backlog,
                pending: VecDeque::new(),
            },
        );
        Ok(())
    }

    fn accept(&self, socket: SocketHandle) -> Result<(SocketHandle, String)> {
        let mut state = self.state();
        let address = socket_entry(&mut state, socket)?
            .bound
            .clone()
            .ok_or_else(|| BareWireError::platform("socket is not bound"))?;
        let listener = state
            .listeners
            .get_mut(&address)
            .ok_or_else(|| BareWireError::platform("socket is not listening"))?;
        let (conn, peer_address) = listener
            .pending
            .pop_front()
            .ok_or_else(|| BareWireError::platform("no pending connection"))?;
        let handle = self.next();
        state.sockets.insert(
            handle,
            SocketEntry {
                kind: SocketKind::Stream,
                bound: Some(address),
                conn: Some((conn, Side::Acceptor)),
                options: HashMap::new(),
            },
        );
        Ok((SocketHandle(handle), peer_address))
    }

    fn connect(&self, socket: SocketHandle, address: &str) -> Result<()> {
        let mut state = self.state();
        socket_entry(&mut state, socket)?;
        let listener = state.listeners.get_mut(address).ok_or_else(|| {
            BareWireError::platform(format!("nothing is listening on `{address}`"))
        })?;
        if listener.pending.len() >= listener.backlog {
            return Err(BareWireError::platform(format!(
                "connection backlog on `{address}` is full"
            )));
        }
        let conn = Arc::new(Conn::default());
        listener
            .pending
            .push_back((Arc::clone(&conn), format!("inmem:{}", socket.0)));
        let entry = socket_entry(&mut state, socket)?;
        entry.conn = Some((conn, Side::Connector));
        Ok(())
    }

    fn send(&self, socket: SocketHandle, bytes: &[u8]) -> Result<usize> {
        let (conn, side) = connected(&self.state(), socket)?;
        let queue = match side {
            Side::Connector => &conn.to_acceptor,
            Side::Acceptor => &conn.to_connector,
        };
        lock_unpoisoned(queue).extend(bytes.iter().copied());
        Ok(bytes.len())
    }

    fn recv(&self, socket: SocketHandle, max_len: usize) -> Result<Vec<u8>> {
        let (conn, side) = connected(&self.state(), socket)?;
        let queue = match side {
            Side::Connector => &conn.to_connector,
            Side::Acceptor => &conn.to_acceptor,
        };
        let mut queue = lock_unpoisoned(queue);
        let take = max_len.min(queue.len());
        Ok(queue.drain(..take).collect())
    }

    fn close(&self, socket: SocketHandle) -> Result<()> {
        let mut state = self.state();
        let entry = state
            .sockets
            .remove(&socket.0)
            .ok_or_else(|| BareWireError::platform("unknown socket handle"))?;
        if let Some(address) = entry.bound {
            if entry.conn.is_none() {
                state.listeners.remove(&address);
            }
        }
        Ok(())
    }

    fn set_option(&self, socket: SocketHandle, option: SocketOption) -> Result<()> {
        let mut state = self.state();
        let entry = socket_entry(&mut state, socket)?;
        entry.options.insert(option.name(), option);
        Ok(())
    }

    fn option(&self, socket: SocketHandle, name: SocketOptionName) -> Result<SocketOption> {
        let mut state = self.state();
        let entry = socket_entry(&mut state, socket)?;
        Ok(entry.options.get(&name).copied().unwrap_or(match name {
            SocketOptionName::NoDelay => SocketOption::NoDelay(false),
            SocketOptionName::ReceiveTimeoutMs => SocketOption::ReceiveTimeoutMs(0),
            SocketOptionName::SendBufferSize => SocketOption::SendBufferSize(64 * 1024),
        }))
    }

    fn resolve(&self, host: &str) -> Result<Vec<String>> {
        if host == "localhost" {
            return Ok(vec!["127.0.0.1".to_string()]);
        }
        Ok(vec![host.to_string()])
    }
}

fn socket_entry<'s>(state: &'s mut State, socket: SocketHandle) -> Result<&'s mut SocketEntry> {
    state
        .sockets
        .get_mut(&socket.0)
        .ok_or_else(|| BareWireError::platform("unknown socket handle"))
}

fn connected(state: &State, socket: SocketHandle) -> Result<(Arc<Conn>, Side)> {
    let entry = state
        .sockets
        .get(&socket.0)
        .ok_or_else(|| BareWireError::platform("unknown socket handle"))?;
    let (conn, side) = entry
        .conn
        .as_ref()
        .ok_or_else(|| BareWireError::platform("socket is not connected"))?;
    Ok((Arc::clone(conn), *side))
}

impl SyncProvider for InMemoryProviders {
    fn mutex_create(&self, name: &str) -> Result<SyncHandle> {
        let mut state = self.state();
        if state.mutexes.contains_key(name) {
            return Err(BareWireError::platform(format!(
                "mutex `{name}` already exists"
            )));
        }
        let object = Arc::new(NamedMutex::default());
        state.mutexes.insert(
            name.to_string(),
            NamedEntry {
                object: Arc::clone(&object),
                refs: 1,
            },
        );
        let handle = self.next();
        state.sync_handles.insert(
            handle,
            SyncObject::Mutex {
                name: name.to_string(),
                object,
            },
        );
        Ok(SyncHandle(handle))
    }

    fn mutex_open(&self, name: &str) -> Result<SyncHandle> {
        let mut state = self.state();
        let object = {
            let entry = state
                .mutexes
                .get_mut(name)
                .ok_or_else(|| BareWireError::platform(format!("mutex `{name}` does not exist")))?;
            entry.refs += 1;
            Arc::clone(&entry.object)
        };
        let handle = self.next();
        state.sync_handles.insert(
            handle,
            SyncObject::Mutex {
                name: name.to_string(),
                object,
            },
        );
        Ok(SyncHandle(handle))
    }

    fn mutex_acquire(&self, mutex: SyncHandle, timeout_ms: Option<u64>) -> Result<bool> {
        let object = {
            let state = self.state();
            match state.sync_handles.get(&mutex.0) {
                Some(SyncObject::Mutex { object, .. }) => Arc::clone(object),
                _ => return Err(BareWireError::platform("unknown mutex handle")),
            }
        };
        // The registry lock is released; only the named object blocks.
        let mut locked = lock_unpoisoned(&object.locked);
        match timeout_ms {
            None => {
                while *locked {
                    locked = object
                        .cv
                        .wait(locked)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
            Some(ms) => {
                let deadline = Instant::now() + Duration::from_millis(ms);
                while *locked {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    let (guard, _) = object
                        .cv
                        .wait_timeout(locked, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    locked = guard;
                }
            }
        }
        *locked = true;
        Ok(true)
    }

    fn mutex_release(&self, mutex: SyncHandle) -> Result<()> {
        let object = {
            let state = self.state();
            match state.sync_handles.get(&mutex.0) {
                Some(SyncObject::Mutex { object, .. }) => Arc::clone(object),
                _ => return Err(BareWireError::platform("unknown mutex handle")),
            }
        };
        let mut locked = lock_unpoisoned(&object.locked);
        if !*locked {
            return Err(BareWireError::platform("mutex is not held"));
        }
        *locked = false;
        drop(locked);
        object.cv.notify_one();
        Ok(())
    }

    fn mutex_close(&self, mutex: SyncHandle) -> Result<()> {
        let mut state = self.state();
        match state.sync_handles.remove(&mutex.0) {
            Some(SyncObject::Mutex { name, .. }) => {
                if let Some(entry) = state.mutexes.get_mut(&name) {
                    entry.refs -= 1;
                    if entry.refs == 0 {
                        state.mutexes.remove(&name);
                    }
                }
                Ok(())
            }
            Some(other) => {
                state.sync_handles.insert(mutex.0, other);
                Err(BareWireError::platform("handle is not a mutex"))
            }
            None => Err(BareWireError::platform("unknown mutex handle")),
        }
    }

    fn semaphore_create(&self, name: &str, initial: u32, max: u32) -> Result<SyncHandle> {
        if initial > max {
            return Err(BareWireError::platform(
                "initial semaphore count exceeds maximum",
            ));
        }
        let mut state = self.state();
        if state.semaphores.contains_key(name) {
            return Err(BareWireError::platform(format!(
                "semaphore `{name}` already exists"
            )));
        }
        let object = Arc::new(NamedSemaphore {
            count: Mutex::new(initial),
            max,
            cv: Condvar::new(),
        });
        state.semaphores.insert(
            name.to_string(),
            NamedEntry {
                object: Arc::clone(&object),
                refs: 1,
            },
        );
        let handle = self.next();
        state.sync_handles.insert(
            handle,
            SyncObject::Semaphore {
                name: name.to_string(),
                object,
            },
        );
        Ok(SyncHandle(handle))
    }

    fn semaphore_open(&self, name: &str) -> Result<SyncHandle> {
        let mut state = self.state();
        let object = {
            let entry = state.semaphores.get_mut(name).ok_or_else(|| {
                BareWireError::platform(format!("semaphore `{name}` does not exist"))
            })?;
            entry.refs += 1;
            Arc::clone(&entry.object)
        };
        let handle = self.next();
        state.sync_handles.insert(
            handle,
            SyncObject::Semaphore {
                name: name.to_string(),
                object,
            },
        );
        Ok(SyncHandle(handle))
    }

    fn semaphore_acquire(&self, semaphore: SyncHandle, timeout_ms: Option<u64>) -> Result<bool> {
        let object = {
            let state = self.state();
            match state.sync_handles.get(&semaphore.0) {
                Some(SyncObject::Semaphore { object, .. }) => Arc::clone(object),
                _ => return Err(BareWireError::platform("unknown semaphore handle")),
            }
        };
        let mut count = lock_unpoisoned(&object.count);
        match timeout_ms {
            None => {
                while *count == 0 {
                    count = object
                        .cv
                        .wait(count)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
            Some(ms) => {
                let deadline = Instant::now() + Duration::from_millis(ms);
                while *count == 0 {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    let (guard, _) = object
                        .cv
                        .wait_timeout(count, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    count = guard;
                }
            }
        }
        *count -= 1;
        Ok(true)
    }

    fn semaphore_release(&self, semaphore: SyncHandle, release_count: u32) -> Result<()> {
        let object = {
            let state = self.state();
            match state.sync_handles.get(&semaphore.0) {
                Some(SyncObject::Semaphore { object, .. }) => Arc::clone(object),
                _ => return Err(BareWireError::platform("unknown semaphore handle")),
            }
        };
        let mut count = lock_unpoisoned(&object.count);
        let new_count = count
            .checked_add(release_count)
            .filter(|&n| n <= object.max)
            .ok_or_else(|| {
                BareWireError::platform("semaphore count would exceed maximum")
            })?;
        *count = new_count;
        drop(count);
        object.cv.notify_all();
        Ok(())
    }

    fn semaphore_close(&self, semaphore: SyncHandle) -> Result<()> {
        let mut state = self.state();
        match state.sync_handles.remove(&semaphore.0) {
            Some(SyncObject::Semaphore { name, .. }) => {
                if let Some(entry) = state.semaphores.get_mut(&name) {
                    entry.refs -= 1;
                    if entry.refs == 0 {
                        state.semaphores.remove(&name);
                    }
                }
                Ok(())
            }
            Some(other) => {
                state.sync_handles.insert(semaphore.0, other);
                Err(BareWireError::platform("handle is not a semaphore"))
            }
            None => Err(BareWireError::platform("unknown semaphore handle")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::contracts::mapping_slice_mut;

    #[test]
    fn test_anonymous_mapping_lifecycle() {
        let providers = InMemoryProviders::new();
        let mut mapping = providers
            .map_anon(64, Sharing::Private, Access::ReadWrite)
            .unwrap();
        unsafe {
            let slice = mapping_slice_mut(&mut mapping).unwrap();
            assert_eq!(slice.len(), 64);
            assert!(slice.iter().all(|&b| b == 0));
            slice[0] = 0xAB;
            assert_eq!(mapping_slice(&mapping)[0], 0xAB);
        }
        providers.lock(&mapping, 0, 64).unwrap();
        providers.unlock(&mapping, 0, 64).unwrap();
        assert!(providers.lock(&mapping, 60, 8).is_err());
        providers.unmap(mapping).unwrap();
    }

    #[test]
    fn test_read_only_mapping_refuses_mutable_slice() {
        let providers = InMemoryProviders::new();
        let mut mapping = providers
            .map_anon(8, Sharing::Private, Access::ReadOnly)
            .unwrap();
        unsafe {
            assert!(mapping_slice_mut(&mut mapping).is_err());
        }
        providers.unmap(mapping).unwrap();
    }

    #[test]
    fn test_shared_memory_aliases_one_buffer() {
        let providers = InMemoryProviders::new();
        let mut writer = providers.shm_create("region", 16).unwrap();
        assert!(providers.resource_exists("region", ResourceKind::SharedMemory));

        let reader = providers.shm_open("region").unwrap();
        unsafe {
            mapping_slice_mut(&mut writer).unwrap()[3] = 0x5A;
            assert_eq!(mapping_slice(&reader)[3], 0x5A);
        }

        providers.shm_close("region", reader).unwrap();
        assert!(providers.resource_exists("region", ResourceKind::SharedMemory));
        providers.shm_close("region", writer).unwrap();
        assert!(!providers.resource_exists("region", ResourceKind::SharedMemory));
    }

    #[test]
    fn test_pipe_roundtrip_both_directions() {
        let providers = InMemoryProviders::new();
        let server = providers.pipe_create("ctl").unwrap();
        let client = providers.pipe_connect("ctl").unwrap();

        providers.pipe_write(client, b"hello").unwrap();
        assert_eq!(providers.pipe_read(server, 3).unwrap(), b"hel");
        assert_eq!(providers.pipe_read(server, 16).unwrap(), b"lo");
        assert_eq!(providers.pipe_read(server, 16).unwrap(), b"");

        providers.pipe_write(server, b"ack").unwrap();
        assert_eq!(providers.pipe_read(client, 16).unwrap(), b"ack");

        providers.pipe_close(client).unwrap();
        providers.pipe_close(server).unwrap();
        assert!(!providers.resource_exists("ctl", ResourceKind::Pipe));
        assert!(providers.pipe_connect("ctl").is_err());
    }

    #[test]
    fn test_socket_loopback() {
        let providers = InMemoryProviders::new();
        let listener = providers.socket_create(SocketKind::Stream).unwrap();
        providers.bind(listener, "127.0.0.1:9000").unwrap();
        providers.listen(listener, 4).unwrap();

        let client = providers.socket_create(SocketKind::Stream).unwrap();
        providers.connect(client, "127.0.0.1:9000").unwrap();
        let (server, peer) = providers.accept(listener).unwrap();
        assert!(peer.starts_with("inmem:"));

        providers.send(client, b"ping").unwrap();
        assert_eq!(providers.recv(server, 16).unwrap(), b"ping");
        providers.send(server, b"pong").unwrap();
        assert_eq!(providers.recv(client, 16).unwrap(), b"pong");

        providers
            .set_option(client, SocketOption::NoDelay(true))
            .unwrap();
        assert_eq!(
            providers.option(client, SocketOptionName::NoDelay).unwrap(),
            SocketOption::NoDelay(true)
        );

        providers.close(client).unwrap();
        providers.close(server).unwrap();
        providers.close(listener).unwrap();
        let other = providers.socket_create(SocketKind::Stream).unwrap();
        assert!(providers.connect(other, "127.0.0.1:9000").is_err());
    }

    #[test]
    fn test_accept_without_pending_connection_fails() {
        let providers = InMemoryProviders::new();
        let listener = providers.socket_create(SocketKind::Stream).unwrap();
        providers.bind(listener, "addr").unwrap();
        providers.listen(listener, 1).unwrap();
        assert!(providers.accept(listener).is_err());
    }

    #[test]
    fn test_resolve_localhost() {
        let providers = InMemoryProviders::new();
        assert_eq!(providers.resolve("localhost").unwrap(), ["127.0.0.1"]);
        assert_eq!(providers.resolve("10.0.0.1").unwrap(), ["10.0.0.1"]);
    }

    #[test]
    fn test_named_mutex_exclusion_and_timeout() {
        let providers = InMemoryProviders::new();
        let held = providers.mutex_create("guard").unwrap();
        assert!(providers.mutex_acquire(held, Some(100)).unwrap());

        let contender = providers.mutex_open("guard").unwrap();
        assert!(!providers.mutex_acquire(contender, Some(20)).unwrap());

        providers.mutex_release(held).unwrap();
        assert!(providers.mutex_acquire(contender, Some(100)).unwrap());
        providers.mutex_release(contender).unwrap();

        providers.mutex_close(contender).unwrap();
        providers.mutex_close(held).unwrap();
        assert!(!providers.resource_exists("guard", ResourceKind::Mutex));
    }

    #[test]
    fn test_release_unheld_mutex_fails() {
        let providers = InMemoryProviders::new();
        let mutex = providers.mutex_create("m").unwrap();
        assert!(providers.mutex_release(mutex).is_err());
    }

    #[test]
    fn test_semaphore_counts() {
        let providers = InMemoryProviders::new();
        let sem = providers.semaphore_create("slots", 2, 2).unwrap();
        assert!(providers.semaphore_acquire(sem, Some(10)).unwrap());
        assert!(providers.semaphore_acquire(sem, Some(10)).unwrap());
        assert!(!providers.semaphore_acquire(sem, Some(10)).unwrap());

        providers.semaphore_release(sem, 1).unwrap();
        assert!(providers.semaphore_acquire(sem, Some(10)).unwrap());

        // Releasing past the maximum is refused.
        providers.semaphore_release(sem, 2).unwrap();
        assert!(providers.semaphore_release(sem, 1).is_err());
        providers.semaphore_close(sem).unwrap();
    }

    #[test]
    fn test_mutex_handoff_across_threads() {
        let providers = Arc::new(InMemoryProviders::new());
        let held = providers.mutex_create("cross").unwrap();
        assert!(providers.mutex_acquire(held, None).unwrap());

        let worker = {
            let providers = Arc::clone(&providers);
            std::thread::spawn(move || {
                let handle = providers.mutex_open("cross").unwrap();
                let acquired = providers.mutex_acquire(handle, Some(2_000)).unwrap();
                providers.mutex_release(handle).unwrap();
                providers.mutex_close(handle).unwrap();
                acquired
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        providers.mutex_release(held).unwrap();
        assert!(worker.join().unwrap());
        providers.mutex_close(held).unwrap();
    }

    #[test]
    fn test_file_mapping_reads_and_flushes() {
        let providers = InMemoryProviders::new();
        let path = std::env::temp_dir().join("barewire-inmem-map-test.bin");
        let path_str = path.to_string_lossy().to_string();
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();

        let mut mapping = providers
            .map_file(&path_str, 1, 2, Access::ReadWrite)
            .unwrap();
        unsafe {
            assert_eq!(mapping_slice(&mapping), &[2, 3]);
            mapping_slice_mut(&mut mapping).unwrap()[0] = 9;
        }
        providers.flush(&mapping, 0, 2).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), [1, 9, 3, 4]);

        providers.unmap(mapping).unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
