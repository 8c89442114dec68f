//! Redis-backed [`SharedStore`].
//!
//! Single-key commands go through a shared [`ConnectionManager`]. Blocking
//! pops use a dedicated connection per call so a waiting `BLPOP` never stalls
//! the commands multiplexed on the shared one.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::traits::{AdmissionOutcome, SharedStore};

/// Upper bound on a single `BLPOP` round trip. Longer waits are issued as
/// consecutive slices so no single reply outlives the client's response timeout.
const BLOCKING_SLICE: Duration = Duration::from_millis(400);

/// Number of keys requested per `SCAN` page.
const SCAN_PAGE: u32 = 100;

/// Lua scripts for multi-step operations that must be atomic server-side.
mod scripts {
    use redis::Script;

    /// KEYS[1] status key, KEYS[2] counter key, ARGV[1] status, ARGV[2] limit.
    /// Returns {0, active} admitted, {1, 0} duplicate, {2, active} overloaded.
    pub fn admit() -> Script {
        Script::new(
            r"
            if redis.call('EXISTS', KEYS[1]) == 1 then
                return {1, 0}
            end
            local active = tonumber(redis.call('GET', KEYS[2]) or '0')
            if active >= tonumber(ARGV[2]) then
                return {2, active}
            end
            redis.call('SET', KEYS[1], ARGV[1])
            return {0, redis.call('INCR', KEYS[2])}
            ",
        )
    }

    /// KEYS[1] counter key. Decrements and clamps at zero.
    pub fn decrement_saturating() -> Script {
        Script::new(
            r"
            local value = redis.call('DECR', KEYS[1])
            if value < 0 then
                redis.call('SET', KEYS[1], 0)
                value = 0
            end
            return value
            ",
        )
    }
}

/// Shared store living in a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisStore {
    /// Connects to the Redis server at `redis_url` (`redis://host:port`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to Redis store at {}", redis_url);

        let client = redis::Client::open(redis_url)
            .map_err(|e| anyhow::anyhow!("failed to create Redis client: {e}"))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to Redis: {e}"))?;

        info!("Connected to Redis store");
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn decrement_saturating(&self, key: &str) -> anyhow::Result<i64> {
        let mut conn = self.conn.clone();
        let script = scripts::decrement_saturating();
        let value = script
            .key(key)
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn push_front(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn push_back(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn pop_front(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lpop(key, None).await?)
    }

    async fn pop_front_wait(
        &self,
        key: &str,
        timeout: Duration,
    ) -> anyhow::Result<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            // BLPOP treats 0 as "forever"; keep every slice strictly positive.
            let slice = remaining.min(BLOCKING_SLICE).max(Duration::from_millis(10));

            let popped: Option<(String, String)> = redis::cmd("BLPOP")
                .arg(key)
                .arg(slice.as_secs_f64())
                .query_async(&mut conn)
                .await?;

            if let Some((_, value)) = popped {
                debug!(key, "blocking pop delivered");
                return Ok(Some(value));
            }
        }
    }

    async fn list_len(&self, key: &str) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(key).await?)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();

        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE)
                .query_async(&mut conn)
                .await?;
            keys.extend(page);

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> anyhow::Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        Ok(conn.del(keys).await?)
    }

    async fn try_admit(
        &self,
        status_key: &str,
        status: &str,
        counter_key: &str,
        limit: u32,
    ) -> anyhow::Result<AdmissionOutcome> {
        let mut conn = self.conn.clone();
        let script = scripts::admit();
        let reply = script
            .key(status_key)
            .key(counter_key)
            .arg(status)
            .arg(limit)
            .invoke_async::<Vec<i64>>(&mut conn)
            .await?;

        match reply.as_slice() {
            [0, active] => Ok(AdmissionOutcome::Admitted { active: *active }),
            [1, _] => Ok(AdmissionOutcome::Duplicate),
            [2, active] => Ok(AdmissionOutcome::Overloaded { active: *active }),
            other => Err(anyhow::anyhow!("unexpected admission reply: {other:?}")),
        }
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
