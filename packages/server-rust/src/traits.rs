use std::time::Duration;

use async_trait::async_trait;

/// Result of an atomic admission attempt against the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Status record created and counter incremented.
    Admitted {
        /// Counter value after the increment.
        active: i64,
    },
    /// A status record already exists for the id. Nothing was written.
    Duplicate,
    /// The counter was already at or above the limit. Nothing was written.
    Overloaded {
        /// Counter value observed at rejection time.
        active: i64,
    },
}

/// Shared key/value + list store that gateway and dispatcher processes meet in.
///
/// Every method is a single atomic step against the store. Multi-key
/// atomicity is only promised by [`SharedStore::try_admit`].
/// Implementations: Redis (production), memory (tests, single process).
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Write a string value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Decrement an integer key, never going below zero. Returns the new value.
    async fn decrement_saturating(&self, key: &str) -> anyhow::Result<i64>;

    /// Insert at the head of a list.
    async fn push_front(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Append at the tail of a list.
    async fn push_back(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Remove and return the head of a list without waiting.
    async fn pop_front(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Remove and return the head of a list, waiting up to `timeout` for a
    /// push to arrive. Returns `None` when the timeout elapses first.
    ///
    /// Implementations must be woken by pushes rather than polling.
    async fn pop_front_wait(&self, key: &str, timeout: Duration)
        -> anyhow::Result<Option<String>>;

    /// Length of a list. Missing lists have length zero.
    async fn list_len(&self, key: &str) -> anyhow::Result<u64>;

    /// All keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    /// Delete the given keys of any type. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> anyhow::Result<u64>;

    /// Atomically admit an operation.
    ///
    /// In one indivisible step: if `status_key` exists, report `Duplicate`;
    /// else if the integer at `counter_key` is `>= limit`, report
    /// `Overloaded`; else set `status_key` to `status` and increment
    /// `counter_key`.
    async fn try_admit(
        &self,
        status_key: &str,
        status: &str,
        counter_key: &str,
        limit: u32,
    ) -> anyhow::Result<AdmissionOutcome>;

    /// Check that the store is reachable.
    async fn ping(&self) -> anyhow::Result<()>;
}
