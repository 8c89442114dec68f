//! Persisted key layout in the shared store.
//!
//! Key names are shared with every gateway and dispatcher instance that
//! points at the same store, so they must not change.

use crate::types::OperationKind;

/// Prefix of per-operation status keys (`operation-status:{id}`).
pub const STATUS_PREFIX: &str = "operation-status:";

/// Prefix of per-operation result channel keys (`operation-result:{id}`).
pub const RESULT_PREFIX: &str = "operation-result:";

/// Integer key counting admitted operations that have not finished.
pub const ACTIVE_REQUESTS: &str = "active-requests";

/// List key holding serialized sync operations.
pub const SYNC_QUEUE: &str = "sync-queue";

/// List key holding serialized async operations.
pub const ASYNC_QUEUE: &str = "async-queue";

/// Status key for an operation id.
#[must_use]
pub fn status_key(id: &str) -> String {
    format!("{STATUS_PREFIX}{id}")
}

/// Result channel key for an operation id.
#[must_use]
pub fn result_key(id: &str) -> String {
    format!("{RESULT_PREFIX}{id}")
}

/// Queue key for an operation kind.
#[must_use]
pub fn queue_key(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Sync => SYNC_QUEUE,
        OperationKind::Async => ASYNC_QUEUE,
    }
}
