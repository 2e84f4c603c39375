//! Redis store adapter
//!
//! Work queues map to lists (BLPOP/RPUSH) and streams to consumer groups
//! (XGROUP/XREADGROUP/XACK).

use super::{GroupCreation, QueueStore, StreamStore};
use crate::entry::{PendingEntry, StreamEntry, StreamFields};
use crate::error::{ConsumerError, ConsumerResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, RedisResult};
use std::time::Duration;
use tracing::{debug, warn};

// Reply of XREADGROUP: [(stream, [(id, [(field, value)])])]. Fields stay raw
// so one entry with non-UTF-8 bytes cannot fail the whole batch.
type StreamReply = Vec<(String, Vec<(String, Vec<(Vec<u8>, Vec<u8>)>)>)>;

/// Store adapter backed by a Redis `ConnectionManager`.
///
/// The connection manager reconnects on its own; commands issued while Redis
/// is unreachable fail with `ConsumerError::Redis`.
#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
}

impl RedisStore {
    /// Create a new RedisStore
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Get a clone of the Redis connection manager
    pub fn connection(&self) -> ConnectionManager {
        self.redis.clone()
    }
}

fn is_busy_group(err: &RedisError) -> bool {
    err.to_string().contains("BUSYGROUP")
}

fn nogroup_or(err: RedisError, stream: &str, group: &str) -> ConsumerError {
    if err.to_string().contains("NOGROUP") {
        ConsumerError::NoGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        }
    } else {
        ConsumerError::Redis(err)
    }
}

/// Build an entry from raw field bytes, replacing invalid UTF-8 with U+FFFD
fn decode_entry(id: String, raw: Vec<(Vec<u8>, Vec<u8>)>) -> StreamEntry {
    let mut lossy = false;
    let mut text = |bytes: Vec<u8>| match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            lossy = true;
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    let fields = raw
        .into_iter()
        .map(|(field, value)| (text(field), text(value)))
        .collect::<StreamFields>();

    if lossy {
        warn!(entry_id = %id, "Stream entry is not valid UTF-8, invalid bytes replaced");
    }

    StreamEntry::new(id, fields)
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn blocking_pop(&self, key: &str, timeout: Duration) -> ConsumerResult<Option<Vec<u8>>> {
        let mut conn = self.redis.clone();

        // BLPOP accepts fractional seconds; the reply is (key, element) or nil
        let reply: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|(_key, payload)| payload))
    }

    async fn push(&self, key: &str, payload: &[u8]) -> ConsumerResult<()> {
        let mut conn = self.redis.clone();

        let len: i64 = redis::cmd("RPUSH")
            .arg(key)
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        debug!(key = %key, len = len, "Pushed message");
        Ok(())
    }

    async fn len(&self, key: &str) -> ConsumerResult<usize> {
        let mut conn = self.redis.clone();

        let len: usize = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn range(&self, key: &str, count: usize) -> ConsumerResult<Vec<Vec<u8>>> {
        if count == 0 {
            return Ok(vec![]);
        }

        let mut conn = self.redis.clone();

        let items: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(count as i64 - 1)
            .query_async(&mut conn)
            .await?;

        Ok(items)
    }

    async fn clear(&self, key: &str) -> ConsumerResult<usize> {
        let mut conn = self.redis.clone();

        let len: usize = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;

        if len > 0 {
            let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        }

        Ok(len)
    }
}

#[async_trait]
impl StreamStore for RedisStore {
    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
        create_stream: bool,
    ) -> ConsumerResult<GroupCreation> {
        let mut conn = self.redis.clone();

        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE").arg(stream).arg(group).arg(start_id);

        if create_stream {
            cmd.arg("MKSTREAM");
        }

        let result: RedisResult<()> = cmd.query_async(&mut conn).await;

        match result {
            Ok(()) => Ok(GroupCreation::Created),
            Err(e) if is_busy_group(&e) => Ok(GroupCreation::AlreadyExists),
            Err(e) => Err(ConsumerError::Redis(e)),
        }
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> ConsumerResult<Vec<StreamEntry>> {
        let mut conn = self.redis.clone();

        let result: RedisResult<Option<StreamReply>> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(stream)
            .arg(">") // Only entries never delivered to the group
            .query_async(&mut conn)
            .await;

        let streams = match result {
            Ok(Some(streams)) => streams,
            Ok(None) => return Ok(vec![]), // BLOCK timeout
            Err(e) => return Err(nogroup_or(e, stream, group)),
        };

        let entries = streams
            .into_iter()
            .flat_map(|(_stream, entries)| entries)
            .map(|(id, fields)| decode_entry(id, fields))
            .collect();

        Ok(entries)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> ConsumerResult<u64> {
        let mut conn = self.redis.clone();

        let acked: u64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id)
            .query_async(&mut conn)
            .await?;

        Ok(acked)
    }

    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> ConsumerResult<Vec<PendingEntry>> {
        let mut conn = self.redis.clone();

        // Extended form: [(id, consumer, idle_ms, delivery_count)]
        let result: RedisResult<Vec<(String, String, u64, u64)>> = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await;

        let pending = result.map_err(|e| nogroup_or(e, stream, group))?;

        Ok(pending
            .into_iter()
            .map(|(id, consumer, idle_ms, delivery_count)| PendingEntry {
                id,
                consumer,
                idle_ms,
                delivery_count,
            })
            .collect())
    }
}
