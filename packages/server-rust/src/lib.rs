//! opgate server: admission-controlled operation gateway and dispatcher that
//! coordinate through a shared store (Redis, or in-memory for one process).

pub mod app;
pub mod cli;
pub mod network;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod traits;

pub use storage::{open_store, MemoryStore, StoreBackend};
pub use traits::{AdmissionOutcome, SharedStore};
