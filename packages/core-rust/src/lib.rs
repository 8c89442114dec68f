//! opgate core: operation model, lifecycle states, and the persisted key layout
//! shared by gateway and dispatcher processes.

pub mod keys;
pub mod types;

pub use types::{Operation, OperationKind, OperationStatus, ParseStatusError};
