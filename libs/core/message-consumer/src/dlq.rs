//! Dead-letter routing for work queues
//!
//! Each work queue `queue:<name>` has a dead-letter queue `dlq:<name>`.
//! Failed messages are appended there byte-for-byte: the router never decodes,
//! wraps or re-encodes a payload, so an operator can push a dead letter back
//! onto the work queue unchanged.

use crate::error::ConsumerResult;
use crate::keys::KeySpace;
use crate::store::QueueStore;
use std::sync::Arc;
use tracing::info;

/// Number of payload bytes shown in log lines
const PREVIEW_BYTES: usize = 50;

/// Printable prefix of a payload for log lines
pub(crate) fn preview(payload: &[u8]) -> String {
    let end = payload.len().min(PREVIEW_BYTES);
    let mut text = String::from_utf8_lossy(&payload[..end]).into_owned();
    if payload.len() > PREVIEW_BYTES {
        text.push_str("...");
    }
    text
}

/// Routes failed messages to per-queue dead-letter queues
pub struct DeadLetterRouter<S> {
    store: Arc<S>,
    keys: KeySpace,
}

impl<S> Clone for DeadLetterRouter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            keys: self.keys.clone(),
        }
    }
}

impl<S: QueueStore> DeadLetterRouter<S> {
    /// Create a new DeadLetterRouter
    pub fn new(store: Arc<S>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Get the DLQ key for a queue
    pub fn dlq_key(&self, queue_name: &str) -> String {
        self.keys.dlq(queue_name)
    }

    /// Append `raw` unchanged to the dead-letter queue of `queue_name`.
    ///
    /// Store failures are returned to the caller.
    pub async fn route(&self, queue_name: &str, raw: &[u8]) -> ConsumerResult<()> {
        let dlq_key = self.dlq_key(queue_name);
        self.store.push(&dlq_key, raw).await?;

        info!(
            queue = %queue_name,
            dlq = %dlq_key,
            bytes = raw.len(),
            payload = %preview(raw),
            "Sent message to DLQ"
        );

        Ok(())
    }

    /// Number of dead letters for a queue
    pub async fn len(&self, queue_name: &str) -> ConsumerResult<usize> {
        self.store.len(&self.dlq_key(queue_name)).await
    }

    /// Up to `count` dead letters, oldest first, without removing them
    pub async fn list(&self, queue_name: &str, count: usize) -> ConsumerResult<Vec<Vec<u8>>> {
        self.store.range(&self.dlq_key(queue_name), count).await
    }

    /// Drop every dead letter for a queue, returning how many were removed
    pub async fn purge(&self, queue_name: &str) -> ConsumerResult<usize> {
        let dlq_key = self.dlq_key(queue_name);
        let removed = self.store.clear(&dlq_key).await?;

        if removed > 0 {
            info!(dlq = %dlq_key, count = removed, "Purged DLQ");
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsumerError;
    use crate::store::{MemoryStore, MockQueueStore};

    #[tokio::test]
    async fn test_route_preserves_bytes() {
        let store = Arc::new(MemoryStore::new());
        let router = DeadLetterRouter::new(store.clone(), KeySpace::default());

        let raw: &[u8] = b"\xff\xfe{\"id\": 1 }  \n";
        router.route("tasks", raw).await.unwrap();

        assert_eq!(router.len("tasks").await.unwrap(), 1);
        assert_eq!(router.list("tasks", 10).await.unwrap(), vec![raw.to_vec()]);
        assert_eq!(store.len("queue:tasks").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_route_uses_prefixed_key() {
        let mut store = MockQueueStore::new();
        store
            .expect_push()
            .withf(|key, payload| key.to_string() == "app:dlq:tasks" && payload.to_vec() == b"x")
            .times(1)
            .returning(|_, _| Ok(()));

        let router = DeadLetterRouter::new(Arc::new(store), KeySpace::new("app"));
        router.route("tasks", b"x").await.unwrap();
    }

    #[tokio::test]
    async fn test_route_propagates_store_failure() {
        let mut store = MockQueueStore::new();
        store
            .expect_push()
            .returning(|_, _| Err(ConsumerError::store("connection reset")));

        let router = DeadLetterRouter::new(Arc::new(store), KeySpace::default());
        assert!(router.route("tasks", b"payload").await.is_err());
    }

    #[tokio::test]
    async fn test_purge() {
        let store = Arc::new(MemoryStore::new());
        let router = DeadLetterRouter::new(store, KeySpace::default());

        router.route("tasks", b"one").await.unwrap();
        router.route("tasks", b"two").await.unwrap();

        assert_eq!(router.purge("tasks").await.unwrap(), 2);
        assert_eq!(router.purge("tasks").await.unwrap(), 0);
        assert_eq!(router.len("tasks").await.unwrap(), 0);
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(80);
        let shown = preview(long.as_bytes());
        assert_eq!(shown.len(), PREVIEW_BYTES + 3);
        assert!(shown.ends_with("..."));
        assert_eq!(preview(b"short"), "short");
    }
}
