//! Active-request counter under `active-requests`.
//!
//! Incremented atomically at admission (see
//! [`SharedStore::try_admit`](crate::traits::SharedStore::try_admit)) and
//! released exactly once when execution of the admitted operation ends.

use std::sync::Arc;

use opgate_core::keys;

use crate::traits::SharedStore;

#[derive(Clone)]
pub struct ActiveRequestCounter {
    store: Arc<dyn SharedStore>,
}

impl ActiveRequestCounter {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Current number of admitted, unfinished operations. Missing reads as zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or holds a non-integer.
    pub async fn current(&self) -> anyhow::Result<i64> {
        match self.store.get(keys::ACTIVE_REQUESTS).await? {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("active-requests is not an integer: {raw:?}")),
            None => Ok(0),
        }
    }

    /// Releases one slot. Saturates at zero. Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn release(&self) -> anyhow::Result<i64> {
        self.store.decrement_saturating(keys::ACTIVE_REQUESTS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn starts_at_zero_and_never_goes_negative() {
        let counter = ActiveRequestCounter::new(Arc::new(MemoryStore::new()));
        assert_eq!(counter.current().await.unwrap(), 0);
        assert_eq!(counter.release().await.unwrap(), 0);
        assert_eq!(counter.current().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn release_pairs_with_admission() {
        let store = Arc::new(MemoryStore::new());
        let counter = ActiveRequestCounter::new(store.clone());

        store
            .try_admit("operation-status:a", "Pending", keys::ACTIVE_REQUESTS, 5)
            .await
            .unwrap();
        store
            .try_admit("operation-status:b", "Pending", keys::ACTIVE_REQUESTS, 5)
            .await
            .unwrap();
        assert_eq!(counter.current().await.unwrap(), 2);

        assert_eq!(counter.release().await.unwrap(), 1);
        assert_eq!(counter.release().await.unwrap(), 0);
    }
}
