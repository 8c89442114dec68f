//! Status store: operation id -> lifecycle state.

use std::sync::Arc;

use opgate_core::keys;
use opgate_core::OperationStatus;
use tracing::warn;

use crate::traits::SharedStore;

/// Lifecycle records kept under `operation-status:{id}`.
#[derive(Clone)]
pub struct StatusStore {
    store: Arc<dyn SharedStore>,
}

impl StatusStore {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Current state of `id`. `Unknown` when no record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or holds unrecognised text.
    pub async fn get(&self, id: &str) -> anyhow::Result<OperationStatus> {
        let raw = self.store.get(&keys::status_key(id)).await?;
        Ok(OperationStatus::from_stored(raw.as_deref())?)
    }

    /// Raw text stored for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn get_stored(&self, id: &str) -> anyhow::Result<Option<String>> {
        self.store.get(&keys::status_key(id)).await
    }

    /// Moves `id` forward to `next`.
    ///
    /// A transition that would regress the lifecycle (for example a record
    /// executed twice trying to go from `Completed` back to `Pending`) is
    /// skipped and reported as `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn advance(&self, id: &str, next: OperationStatus) -> anyhow::Result<bool> {
        let current = self.get(id).await?;
        if !current.can_transition_to(next) {
            warn!(id, %current, %next, "refusing status regression");
            return Ok(false);
        }
        self.store
            .set(&keys::status_key(id), next.as_str())
            .await?;
        Ok(true)
    }

    /// Deletes every status record. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if enumeration or deletion fails.
    pub async fn clear(&self) -> anyhow::Result<u64> {
        let found = self.store.keys_with_prefix(keys::STATUS_PREFIX).await?;
        self.store.delete(&found).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn status_store() -> (Arc<MemoryStore>, StatusStore) {
        let store = Arc::new(MemoryStore::new());
        (Arc::clone(&store), StatusStore::new(store))
    }

    #[tokio::test]
    async fn missing_record_is_unknown() {
        let (_, status) = status_store();
        assert_eq!(status.get("nope").await.unwrap(), OperationStatus::Unknown);
    }

    #[tokio::test]
    async fn advance_writes_forward_and_skips_regressions() {
        let (store, status) = status_store();

        assert!(status.advance("a", OperationStatus::Pending).await.unwrap());
        assert!(status.advance("a", OperationStatus::Completed).await.unwrap());
        assert!(!status.advance("a", OperationStatus::Pending).await.unwrap());

        assert_eq!(
            store.get("operation-status:a").await.unwrap().as_deref(),
            Some("Completed")
        );
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error() {
        let (store, status) = status_store();
        store.set("operation-status:a", "Sleeping").await.unwrap();
        assert!(status.get("a").await.is_err());
    }

    #[tokio::test]
    async fn stored_text_is_returned_as_is() {
        let (store, status) = status_store();
        assert_eq!(status.get_stored("a").await.unwrap(), None);
        store.set("operation-status:a", "Sleeping").await.unwrap();
        assert_eq!(
            status.get_stored("a").await.unwrap().as_deref(),
            Some("Sleeping")
        );
    }

    #[tokio::test]
    async fn clear_removes_only_status_records() {
        let (store, status) = status_store();
        status.advance("a", OperationStatus::Pending).await.unwrap();
        status.advance("b", OperationStatus::Pending).await.unwrap();
        store.set("active-requests", "2").await.unwrap();

        assert_eq!(status.clear().await.unwrap(), 2);
        assert_eq!(status.get("a").await.unwrap(), OperationStatus::Unknown);
        assert_eq!(
            store.get("active-requests").await.unwrap().as_deref(),
            Some("2")
        );
        assert_eq!(status.clear().await.unwrap(), 0);
    }
}
