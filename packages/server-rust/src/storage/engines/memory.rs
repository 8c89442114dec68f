//! In-process [`SharedStore`] implementation backed by [`DashMap`].
//!
//! Provides concurrent access without external locking for single-key
//! operations. Suitable for tests and for `standalone` deployments where the
//! gateway and dispatcher share one process.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::traits::{AdmissionOutcome, SharedStore};

/// In-memory store with Redis-like string and list semantics.
///
/// Integers are kept as decimal strings so `get` on a counter key reads the
/// same text a Redis-backed deployment would return. List pops are woken by
/// a per-key [`Notify`] instead of polling.
#[derive(Default)]
pub struct MemoryStore {
    values: DashMap<String, String>,
    lists: DashMap<String, VecDeque<String>>,
    waiters: DashMap<String, Arc<Notify>>,
    /// Serializes [`SharedStore::try_admit`] so its check and writes are one step.
    admission: Mutex<()>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn notifier(&self, key: &str) -> Arc<Notify> {
        self.waiters.entry(key.to_string()).or_default().clone()
    }

    fn wake(&self, key: &str) {
        if let Some(notify) = self.waiters.get(key) {
            notify.notify_waiters();
        }
    }

    fn take_front(&self, key: &str) -> Option<String> {
        let mut list = self.lists.get_mut(key)?;
        let value = list.pop_front();
        let now_empty = list.is_empty();
        drop(list);
        if now_empty {
            self.lists.remove_if(key, |_, l| l.is_empty());
        }
        value
    }
}

fn parse_int(key: &str, raw: &str) -> anyhow::Result<i64> {
    raw.parse::<i64>()
        .map_err(|_| anyhow::anyhow!("value at {key} is not an integer: {raw:?}"))
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn decrement_saturating(&self, key: &str) -> anyhow::Result<i64> {
        let mut entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| "0".to_string());
        let next = (parse_int(key, entry.value())? - 1).max(0);
        *entry = next.to_string();
        Ok(next)
    }

    async fn push_front(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        self.wake(key);
        Ok(())
    }

    async fn push_back(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self.wake(key);
        Ok(())
    }

    async fn pop_front(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.take_front(key))
    }

    async fn pop_front_wait(
        &self,
        key: &str,
        timeout: Duration,
    ) -> anyhow::Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let notify = self.notifier(key);

        let value = loop {
            // Register interest before checking so a push landing in between
            // still wakes us.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.take_front(key) {
                break Some(value);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break self.take_front(key);
            }
        };

        // Last waiter out removes the notifier; the map holds one reference.
        drop(notify);
        self.waiters.remove_if(key, |_, n| Arc::strong_count(n) == 1);
        Ok(value)
    }

    async fn list_len(&self, key: &str) -> anyhow::Result<u64> {
        Ok(self.lists.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .values
            .iter()
            .map(|e| e.key().clone())
            .chain(self.lists.iter().map(|e| e.key().clone()))
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> anyhow::Result<u64> {
        let mut removed = 0;
        for key in keys {
            let had_value = self.values.remove(key).is_some();
            let had_list = self.lists.remove(key).is_some();
            if had_value || had_list {
                removed += 1;
            }
            self.waiters.remove(key);
        }
        Ok(removed)
    }

    async fn try_admit(
        &self,
        status_key: &str,
        status: &str,
        counter_key: &str,
        limit: u32,
    ) -> anyhow::Result<AdmissionOutcome> {
        let _admission = self.admission.lock();

        if self.values.contains_key(status_key) {
            return Ok(AdmissionOutcome::Duplicate);
        }

        let active = {
            let mut counter = self
                .values
                .entry(counter_key.to_string())
                .or_insert_with(|| "0".to_string());
            let current = parse_int(counter_key, counter.value())?;
            if current >= i64::from(limit) {
                return Ok(AdmissionOutcome::Overloaded { active: current });
            }
            *counter = (current + 1).to_string();
            current + 1
        };

        self.values
            .insert(status_key.to_string(), status.to_string());
        Ok(AdmissionOutcome::Admitted { active })
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
