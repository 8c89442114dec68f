//! Shared store backends and the factory that selects one at startup.
//!
//! - [`MemoryStore`]: in-process, for tests and `standalone` deployments
//! - [`RedisStore`]: shared between gateway and dispatcher processes
//!   (feature `redis`, on by default)

pub mod engines;
pub mod factory;

pub use engines::MemoryStore;
#[cfg(feature = "redis")]
pub use engines::RedisStore;
pub use factory::{open_store, StoreBackend};
