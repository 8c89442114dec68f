//! Factory for the [`SharedStore`] injected into the gateway and dispatcher.
//!
//! [`open_store`] is the dependency injection point: callers describe the
//! backend with a [`StoreBackend`] and receive an `Arc<dyn SharedStore>`.

use std::fmt;
use std::sync::Arc;

use crate::storage::engines::MemoryStore;
use crate::traits::SharedStore;

/// Which shared store backend to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local store. Only meaningful when gateway and dispatcher share a process.
    Memory,
    /// Redis server reachable at `url` (`redis://host:port`).
    Redis { url: String },
}

impl StoreBackend {
    /// Builds a Redis backend from a host and port pair.
    #[must_use]
    pub fn redis(host: &str, port: u16) -> Self {
        Self::Redis {
            url: format!("redis://{host}:{port}"),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Redis { url } => write!(f, "redis ({url})"),
        }
    }
}

/// Opens the configured backend.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached, or if a Redis backend
/// is requested from a build without the `redis` feature.
pub async fn open_store(backend: &StoreBackend) -> anyhow::Result<Arc<dyn SharedStore>> {
    match backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "redis")]
        StoreBackend::Redis { url } => {
            let store = crate::storage::engines::RedisStore::connect(url).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        StoreBackend::Redis { url } => Err(anyhow::anyhow!(
            "redis backend requested ({url}) but this build has no `redis` feature"
        )),
    }
}
