//! In-memory store adapter
//!
//! Mirrors the Redis semantics the consumers depend on: blocking pops with a
//! timeout, consumer groups with a new-entries cursor, per-group pending sets,
//! idempotent acknowledgement, `BUSYGROUP` and `NOGROUP`.

use super::{GroupCreation, QueueStore, StreamStore};
use crate::entry::{PendingEntry, StreamEntry, StreamFields};
use crate::error::{ConsumerError, ConsumerResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

/// Stream entry ID as (milliseconds, sequence)
type EntryId = (u64, u64);

fn parse_id(id: &str) -> Option<EntryId> {
    let (ms, seq) = match id.split_once('-') {
        Some((ms, seq)) => (ms, seq),
        None => (id, "0"),
    };
    Some((ms.parse().ok()?, seq.parse().ok()?))
}

fn format_id((ms, seq): EntryId) -> String {
    format!("{}-{}", ms, seq)
}

#[derive(Debug)]
struct PendingRecord {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Debug)]
struct Group {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingRecord>,
}

#[derive(Debug, Default)]
struct Stream {
    entries: BTreeMap<EntryId, StreamFields>,
    last_id: EntryId,
    groups: HashMap<String, Group>,
}

#[derive(Debug, Default)]
struct State {
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    streams: HashMap<String, Stream>,
}

/// In-process store implementing both `QueueStore` and `StreamStore`.
///
/// Clones share the same data, so a clone handed to a producer task sees the
/// consumer's queues and streams.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    changed: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to `stream` (XADD with `*`), creating the stream if needed.
    ///
    /// Returns the new entry ID.
    pub async fn append<K, V>(&self, stream: &str, fields: impl IntoIterator<Item = (K, V)>) -> String
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields: StreamFields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let id = {
            let mut state = self.state.lock().await;
            let stream = state.streams.entry(stream.to_string()).or_default();

            let now_ms = Utc::now().timestamp_millis().max(0) as u64;
            let id = if now_ms > stream.last_id.0 {
                (now_ms, 0)
            } else {
                (stream.last_id.0, stream.last_id.1 + 1)
            };

            stream.last_id = id;
            stream.entries.insert(id, fields);
            id
        };

        self.changed.notify_waiters();
        format_id(id)
    }

    /// Number of entries in `stream`
    pub async fn stream_len(&self, stream: &str) -> usize {
        let state = self.state.lock().await;
        state.streams.get(stream).map_or(0, |s| s.entries.len())
    }

    /// Names of the consumer groups attached to `stream`
    pub async fn groups(&self, stream: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut groups: Vec<String> = state
            .streams
            .get(stream)
            .map(|s| s.groups.keys().cloned().collect())
            .unwrap_or_default();
        groups.sort();
        groups
    }

    async fn try_pop(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock().await;
        let list = state.lists.get_mut(key)?;
        let message = list.pop_front();

        if list.is_empty() {
            state.lists.remove(key);
        }

        message
    }

    async fn try_read(
        &self,
        stream_key: &str,
        group_name: &str,
        consumer: &str,
        count: usize,
    ) -> ConsumerResult<Vec<StreamEntry>> {
        let mut state = self.state.lock().await;

        let nogroup = || ConsumerError::NoGroup {
            stream: stream_key.to_string(),
            group: group_name.to_string(),
        };

        let stream = state.streams.get_mut(stream_key).ok_or_else(nogroup)?;
        let group = stream.groups.get_mut(group_name).ok_or_else(nogroup)?;

        let start = (group.last_delivered.0, group.last_delivered.1.saturating_add(1));
        let mut delivered = Vec::new();

        for (id, fields) in stream.entries.range(start..).take(count) {
            group.last_delivered = *id;
            group.pending.insert(
                *id,
                PendingRecord {
                    consumer: consumer.to_string(),
                    delivered_at: Instant::now(),
                    delivery_count: 1,
                },
            );
            delivered.push(StreamEntry::new(format_id(*id), fields.clone()));
        }

        Ok(delivered)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn blocking_pop(&self, key: &str, timeout: Duration) -> ConsumerResult<Option<Vec<u8>>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before checking so a concurrent push is not missed
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_pop(key).await {
                return Ok(Some(message));
            }

            if timeout.is_zero() {
                notified.await;
            } else if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn push(&self, key: &str, payload: &[u8]) -> ConsumerResult<()> {
        {
            let mut state = self.state.lock().await;
            state
                .lists
                .entry(key.to_string())
                .or_default()
                .push_back(payload.to_vec());
        }

        self.changed.notify_waiters();
        Ok(())
    }

    async fn len(&self, key: &str) -> ConsumerResult<usize> {
        let state = self.state.lock().await;
        Ok(state.lists.get(key).map_or(0, VecDeque::len))
    }

    async fn range(&self, key: &str, count: usize) -> ConsumerResult<Vec<Vec<u8>>> {
        let state = self.state.lock().await;
        Ok(state
            .lists
            .get(key)
            .map(|list| list.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, key: &str) -> ConsumerResult<usize> {
        let mut state = self.state.lock().await;
        Ok(state.lists.remove(key).map_or(0, |list| list.len()))
    }
}

#[async_trait]
impl StreamStore for MemoryStore {
    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
        create_stream: bool,
    ) -> ConsumerResult<GroupCreation> {
        let mut state = self.state.lock().await;

        if !state.streams.contains_key(stream) {
            if !create_stream {
                return Err(ConsumerError::store(
                    "ERR The XGROUP subcommand requires the key to exist",
                ));
            }
            state.streams.insert(stream.to_string(), Stream::default());
        }

        let Some(entry_stream) = state.streams.get_mut(stream) else {
            return Err(ConsumerError::store("stream vanished during group creation"));
        };

        if entry_stream.groups.contains_key(group) {
            return Ok(GroupCreation::AlreadyExists);
        }

        let last_delivered = if start_id == "$" {
            entry_stream.last_id
        } else {
            parse_id(start_id).ok_or_else(|| {
                ConsumerError::store(format!("ERR Invalid stream ID specified: {}", start_id))
            })?
        };

        entry_stream.groups.insert(
            group.to_string(),
            Group {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );

        Ok(GroupCreation::Created)
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> ConsumerResult<Vec<StreamEntry>> {
        let deadline = tokio::time::Instant::now() + block;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let entries = self.try_read(stream, group, consumer, count).await?;
            if !entries.is_empty() {
                return Ok(entries);
            }

            if block.is_zero() {
                notified.await;
            } else if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(vec![]);
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> ConsumerResult<u64> {
        let Some(id) = parse_id(id) else {
            return Err(ConsumerError::store(format!(
                "ERR Invalid stream ID specified: {}",
                id
            )));
        };

        let mut state = self.state.lock().await;
        let removed = state
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .and_then(|g| g.pending.remove(&id));

        Ok(u64::from(removed.is_some()))
    }

    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> ConsumerResult<Vec<PendingEntry>> {
        let state = self.state.lock().await;

        let group_state = state
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .ok_or_else(|| ConsumerError::NoGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        Ok(group_state
            .pending
            .iter()
            .take(count)
            .map(|(id, record)| PendingEntry {
                id: format_id(*id),
                consumer: record.consumer.clone(),
                idle_ms: record.delivered_at.elapsed().as_millis() as u64,
                delivery_count: record.delivery_count,
            })
            .collect())
    }
}
