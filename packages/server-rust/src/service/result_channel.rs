//! Per-operation result mailbox for sync submissions.
//!
//! The dispatcher pushes the terminal status onto `operation-result:{id}`;
//! the waiting gateway call consumes it at most once. A marker delivered after
//! the waiter gave up stays in the mailbox until the next clear.

use std::sync::Arc;
use std::time::Duration;

use opgate_core::{keys, OperationStatus};

use crate::traits::SharedStore;

#[derive(Clone)]
pub struct ResultChannel {
    store: Arc<dyn SharedStore>,
}

impl ResultChannel {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Hands the terminal status of `id` to whoever is waiting on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn deliver(&self, id: &str, status: OperationStatus) -> anyhow::Result<()> {
        self.store
            .push_front(&keys::result_key(id), status.as_str())
            .await
    }

    /// Waits up to `budget` for the marker of `id`, consuming it.
    ///
    /// Returns `None` when the budget runs out first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or the marker is not a status.
    pub async fn wait(
        &self,
        id: &str,
        budget: Duration,
    ) -> anyhow::Result<Option<OperationStatus>> {
        let marker = self
            .store
            .pop_front_wait(&keys::result_key(id), budget)
            .await?;
        Ok(marker
            .as_deref()
            .map(str::parse::<OperationStatus>)
            .transpose()?)
    }

    /// Deletes every result mailbox. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if enumeration or deletion fails.
    pub async fn clear(&self) -> anyhow::Result<u64> {
        let found = self.store.keys_with_prefix(keys::RESULT_PREFIX).await?;
        self.store.delete(&found).await
    }
}
