//! Maps platform tags to provider sets, and resolves the current platform's
//! providers lazily.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::debug;

use crate::platform::contracts::{IpcProvider, MemoryProvider, NetworkProvider, SyncProvider};
use crate::platform::in_memory::InMemoryProviders;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    Android,
    Ios,
    WebAssembly,
    /// Process-local providers; always registered.
    InMemory,
}

impl Platform {
    /// The platform this process runs on.
    pub fn current() -> Platform {
        if cfg!(target_arch = "wasm32") {
            Platform::WebAssembly
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::InMemory
        }
    }
}

/// The four provider contracts for one platform.
#[derive(Clone)]
pub struct ProviderSet {
    pub memory: Arc<dyn MemoryProvider>,
    pub ipc: Arc<dyn IpcProvider>,
    pub network: Arc<dyn NetworkProvider>,
    pub sync: Arc<dyn SyncProvider>,
}

impl ProviderSet {
    /// A set where one implementation serves all four contracts.
    pub fn from_single<P>(provider: Arc<P>) -> ProviderSet
    where
        P: MemoryProvider + IpcProvider + NetworkProvider + SyncProvider + 'static,
    {
        ProviderSet {
            memory: provider.clone(),
            ipc: provider.clone(),
            network: provider.clone(),
            sync: provider,
        }
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<Platform, ProviderSet>>> = OnceLock::new();
static RESOLVED: OnceLock<ProviderSet> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<Platform, ProviderSet>> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert(
            Platform::InMemory,
            ProviderSet::from_single(Arc::new(InMemoryProviders::new())),
        );
        Mutex::new(map)
    })
}

/// Register (or replace) the provider set for a platform. OS providers are
/// expected to call this once during initialization, before the first
/// [`providers`] call memoizes its answer.
pub fn register(platform: Platform, providers: ProviderSet) {
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(platform, providers);
}

/// The provider set registered for a specific platform.
pub fn providers_for(platform: Platform) -> Option<ProviderSet> {
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&platform)
        .cloned()
}

/// The current platform's providers, resolved on first use and memoized.
/// Falls back to the in-memory set when nothing is registered for the
/// current platform.
pub fn providers() -> ProviderSet {
    RESOLVED
        .get_or_init(|| {
            let current = Platform::current();
            let resolved = providers_for(current)
                .or_else(|| {
                    debug!(?current, "no providers registered, using in-memory set");
                    providers_for(Platform::InMemory)
                })
                .unwrap_or_else(|| ProviderSet::from_single(Arc::new(InMemoryProviders::new())));
            debug!(?current, "platform providers resolved");
            resolved
        })
        .clone()
}
