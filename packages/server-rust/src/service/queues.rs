//! The sync and async operation queues.
//!
//! Sync operations are pushed to the head of `sync-queue` and async ones to
//! the tail of `async-queue`. Both are consumed from the head, sync first.

use std::sync::Arc;

use opgate_core::{keys, Operation, OperationKind};
use serde::Serialize;

use crate::traits::SharedStore;

/// A raw record taken off one of the queues.
///
/// Decoding is left to the consumer so a malformed record can still be
/// reported against the queue it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dequeued {
    pub kind: OperationKind,
    pub record: String,
}

/// Number of records waiting on each queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    pub sync: u64,
    pub r#async: u64,
}

#[derive(Clone)]
pub struct OperationQueues {
    store: Arc<dyn SharedStore>,
}

impl OperationQueues {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Enqueues an operation on the queue for its kind.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the store push fails.
    pub async fn push(&self, op: &Operation) -> anyhow::Result<()> {
        let record = op.to_record()?;
        let key = keys::queue_key(op.kind);
        match op.kind {
            OperationKind::Sync => self.store.push_front(key, &record).await,
            OperationKind::Async => self.store.push_back(key, &record).await,
        }
    }

    /// Takes the next record without waiting: sync queue first, then async.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn pop_next(&self) -> anyhow::Result<Option<Dequeued>> {
        for kind in [OperationKind::Sync, OperationKind::Async] {
            if let Some(record) = self.store.pop_front(keys::queue_key(kind)).await? {
                return Ok(Some(Dequeued { kind, record }));
            }
        }
        Ok(None)
    }

    /// Current queue lengths.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn depths(&self) -> anyhow::Result<QueueDepths> {
        Ok(QueueDepths {
            sync: self.store.list_len(keys::SYNC_QUEUE).await?,
            r#async: self.store.list_len(keys::ASYNC_QUEUE).await?,
        })
    }
}
