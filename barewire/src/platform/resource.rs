//! Scoped ownership of platform handles: release on every exit path, and
//! bulk release with aggregated failure reporting.

use std::sync::Arc;

use tracing::warn;

use crate::error::{BareWireError, Result};
use crate::platform::contracts::{
    IpcHandle, IpcProvider, MemoryProvider, NetworkProvider, RawMapping, SocketHandle, SyncHandle,
    SyncProvider,
};

/// Anything that can be released exactly once.
pub trait ScopedResource {
    fn release_now(&mut self) -> Result<()>;
}

/// Owns a platform resource and releases it on drop. `release` reports the
/// outcome; dropping without releasing logs failures instead.
pub struct Scoped<H> {
    resource: Option<H>,
    release: Option<Box<dyn FnOnce(H) -> Result<()> + Send>>,
}

impl<H> Scoped<H> {
    pub fn new(resource: H, release: impl FnOnce(H) -> Result<()> + Send + 'static) -> Scoped<H> {
        Scoped {
            resource: Some(resource),
            release: Some(Box::new(release)),
        }
    }

    /// The held resource, or `None` once released.
    pub fn get(&self) -> Option<&H> {
        self.resource.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut H> {
        self.resource.as_mut()
    }

    /// Release now. Idempotent; later calls return `Ok(())`.
    pub fn release(&mut self) -> Result<()> {
        match (self.resource.take(), self.release.take()) {
            (Some(resource), Some(release)) => release(resource),
            _ => Ok(()),
        }
    }

    /// Take the resource out without releasing it; the caller assumes
    /// ownership.
    pub fn into_inner(mut self) -> Option<H> {
        self.release = None;
        self.resource.take()
    }
}

impl<H> ScopedResource for Scoped<H> {
    fn release_now(&mut self) -> Result<()> {
        self.release()
    }
}

impl<H> Drop for Scoped<H> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(%err, "resource release failed during drop");
        }
    }
}

pub fn scoped_mapping(
    provider: Arc<dyn MemoryProvider>,
    mapping: RawMapping,
) -> Scoped<RawMapping> {
    Scoped::new(mapping, move |m| provider.unmap(m))
}

pub fn scoped_pipe(provider: Arc<dyn IpcProvider>, pipe: IpcHandle) -> Scoped<IpcHandle> {
    Scoped::new(pipe, move |p| provider.pipe_close(p))
}

pub fn scoped_socket(
    provider: Arc<dyn NetworkProvider>,
    socket: SocketHandle,
) -> Scoped<SocketHandle> {
    Scoped::new(socket, move |s| provider.close(s))
}

pub fn scoped_mutex(provider: Arc<dyn SyncProvider>, mutex: SyncHandle) -> Scoped<SyncHandle> {
    Scoped::new(mutex, move |m| provider.mutex_close(m))
}

pub fn scoped_semaphore(
    provider: Arc<dyn SyncProvider>,
    semaphore: SyncHandle,
) -> Scoped<SyncHandle> {
    Scoped::new(semaphore, move |s| provider.semaphore_close(s))
}

/// Release every resource, attempting each one even after failures, and
/// aggregate what went wrong into a single report.
pub fn release_all<'r>(
    resources: impl IntoIterator<Item = Box<dyn ScopedResource + 'r>>,
) -> Result<()> {
    let mut failures = Vec::new();
    for mut resource in resources {
        if let Err(err) = resource.release_now() {
            failures.push(err.to_string());
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(BareWireError::platform(format!(
            "{} release failure(s): {}",
            failures.len(),
            failures.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_scoped_releases_on_drop() {
        static RELEASED: AtomicUsize = AtomicUsize::new(0);
        {
            let _scoped = Scoped::new(7u64, |_| {
                RELEASED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(RELEASED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut scoped = Scoped::new((), move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        scoped.release().unwrap();
        scoped.release().unwrap();
        drop(scoped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_inner_defuses_release() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let scoped = Scoped::new(5u8, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(scoped.into_inner(), Some(5));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_release_all_aggregates_failures() {
        let resources: Vec<Box<dyn ScopedResource>> = vec![
            Box::new(Scoped::new((), |()| Ok(()))),
            Box::new(Scoped::new((), |()| {
                Err(BareWireError::platform("first failure"))
            })),
            Box::new(Scoped::new((), |()| {
                Err(BareWireError::platform("second failure"))
            })),
        ];
        let err = release_all(resources).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("2 release failure(s)"), "{text}");
        assert!(text.contains("first failure"), "{text}");
        assert!(text.contains("second failure"), "{text}");
    }

    #[test]
    fn test_release_all_empty_is_ok() {
        assert!(release_all(Vec::<Box<dyn ScopedResource>>::new()).is_ok());
    }
}
