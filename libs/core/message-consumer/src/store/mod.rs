//! Store adapters.
//!
//! The consumers never touch Redis directly. They go through two narrow
//! traits: [`QueueStore`] for list-backed work queues and [`StreamStore`] for
//! consumer-group streams. All shared state (queue contents, pending sets,
//! group cursors) lives behind these traits; consumers keep none of it
//! between iterations.
//!
//! - [`RedisStore`]: Redis over a `ConnectionManager`
//! - `MemoryStore`: in-process store with the same semantics, for tests and
//!   local development. Only built with the `memory` feature.

#[cfg(any(test, feature = "memory"))]
mod memory;
mod redis;

#[cfg(any(test, feature = "memory"))]
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::entry::{PendingEntry, StreamEntry};
use crate::error::ConsumerResult;
use async_trait::async_trait;
use std::time::Duration;
use strum::{AsRefStr, Display};

/// Result of creating a consumer group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum GroupCreation {
    /// The group was created by this call
    Created,
    /// The group already existed (`BUSYGROUP`); nothing changed
    AlreadyExists,
}

/// List-backed FIFO queue primitives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Remove and return the oldest message, waiting up to `timeout`.
    ///
    /// Returns `None` when the timeout elapses. A zero timeout waits forever.
    async fn blocking_pop(&self, key: &str, timeout: Duration) -> ConsumerResult<Option<Vec<u8>>>;

    /// Append a message as the newest element
    async fn push(&self, key: &str, payload: &[u8]) -> ConsumerResult<()>;

    /// Number of messages in the queue
    async fn len(&self, key: &str) -> ConsumerResult<usize>;

    /// Up to `count` messages, oldest first, without removing them
    async fn range(&self, key: &str, count: usize) -> ConsumerResult<Vec<Vec<u8>>>;

    /// Remove every message, returning how many were removed
    async fn clear(&self, key: &str) -> ConsumerResult<usize>;
}

/// Consumer-group stream primitives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Create `group` on `stream` starting after `start_id`.
    ///
    /// An existing group yields `GroupCreation::AlreadyExists`. Every other
    /// failure is an error.
    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
        create_stream: bool,
    ) -> ConsumerResult<GroupCreation>;

    /// Read up to `count` entries never delivered to the group (cursor `>`).
    ///
    /// Waits up to `block` when none are available and returns an empty batch
    /// on timeout. Delivered entries join `consumer`'s pending set.
    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> ConsumerResult<Vec<StreamEntry>>;

    /// Remove `id` from the group's pending set.
    ///
    /// Returns the number of entries acknowledged (0 when already acknowledged).
    async fn ack(&self, stream: &str, group: &str, id: &str) -> ConsumerResult<u64>;

    /// Up to `count` entries of the group's pending set, lowest ID first
    async fn pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> ConsumerResult<Vec<PendingEntry>>;
}
