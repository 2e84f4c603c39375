//! Stream processor behaviour against the in-memory store

use message_consumer::{
    EntryOutcome, GroupCreation, MemoryStore, StreamConfig, StreamFields, StreamProcessor,
    StreamStore,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

fn config(consumer: &str) -> StreamConfig {
    StreamConfig::new("events", "processors")
        .with_consumer(consumer)
        .with_block_timeout(Duration::from_millis(50))
}

fn processor(store: &Arc<MemoryStore>, consumer: &str) -> StreamProcessor<MemoryStore> {
    StreamProcessor::new(store.clone(), config(consumer))
}

fn accept_all(_: &StreamFields) -> eyre::Result<bool> {
    Ok(true)
}

#[tokio::test]
async fn test_processed_entry_is_acknowledged() {
    let store = Arc::new(MemoryStore::new());
    let processor = processor(&store, "worker-1");
    processor.ensure_group().await.unwrap();

    let id = store.append("stream:events", [("type", "click")]).await;

    let seen = Mutex::new(Vec::new());
    let handler = |fields: &StreamFields| -> eyre::Result<bool> {
        seen.lock().unwrap().push(fields.clone());
        Ok(true)
    };

    let outcomes = processor.process_batch(&handler).await.unwrap();

    assert_eq!(outcomes, vec![(id, EntryOutcome::Acked)]);
    assert_eq!(seen.lock().unwrap()[0].get("type").map(String::as_str), Some("click"));
    assert!(processor.pending(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_faulted_entry_stays_pending_and_is_not_redelivered() {
    let store = Arc::new(MemoryStore::new());
    let processor = processor(&store, "worker-1");
    processor.ensure_group().await.unwrap();

    let id = store.append("stream:events", [("type", "click")]).await;

    let failing = |_: &StreamFields| -> eyre::Result<bool> { Err(eyre::eyre!("database locked")) };
    let outcomes = processor.process_batch(&failing).await.unwrap();
    assert!(matches!(&outcomes[0].1, EntryOutcome::Faulted(reason) if reason.contains("database locked")));

    let pending = processor.pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].consumer, "worker-1");
    assert_eq!(pending[0].delivery_count, 1);

    // The `>` cursor has moved past the entry
    let again = processor.process_batch(&accept_all).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(processor.pending(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_and_panicking_entries_stay_pending() {
    let store = Arc::new(MemoryStore::new());
    let processor = processor(&store, "worker-1");
    processor.ensure_group().await.unwrap();

    store.append("stream:events", [("type", "skip")]).await;
    store.append("stream:events", [("type", "crash")]).await;

    let handler = |fields: &StreamFields| -> eyre::Result<bool> {
        match fields.get("type").map(String::as_str) {
            Some("skip") => Ok(false),
            _ => panic!("malformed event"),
        }
    };

    let outcomes = processor.process_batch(&handler).await.unwrap();
    assert_eq!(outcomes[0].1, EntryOutcome::Rejected);
    assert!(matches!(&outcomes[1].1, EntryOutcome::Faulted(reason) if reason.starts_with("panic")));
    assert_eq!(processor.pending(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_reacknowledging_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    let processor = processor(&store, "worker-1");
    processor.ensure_group().await.unwrap();

    let id = store.append("stream:events", [("type", "click")]).await;
    processor.process_batch(&accept_all).await.unwrap();

    assert_eq!(store.ack("stream:events", "processors", &id).await.unwrap(), 0);
    assert!(processor.pending(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_group_members_receive_disjoint_entries() {
    let store = Arc::new(MemoryStore::new());
    let first = StreamProcessor::new(store.clone(), config("worker-1").with_batch_size(2));
    let second = StreamProcessor::new(store.clone(), config("worker-2").with_batch_size(2));
    first.ensure_group().await.unwrap();

    for n in 0..4 {
        store
            .append("stream:events", [("seq", n.to_string())])
            .await;
    }

    // Both members read at the same time
    let (a, b) = tokio::join!(
        first.process_batch(&accept_all),
        second.process_batch(&accept_all)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.len(), 2);
    assert_eq!(b.len(), 2);

    let ids: HashSet<String> = a.iter().chain(b.iter()).map(|(id, _)| id.clone()).collect();
    assert_eq!(ids.len(), 4);
}

#[tokio::test]
async fn test_waiting_group_members_split_new_entries() {
    let store = Arc::new(MemoryStore::new());
    let slow = |consumer: &str| config(consumer).with_block_timeout(Duration::from_secs(5));
    let first = StreamProcessor::new(store.clone(), slow("worker-1"));
    let second = StreamProcessor::new(store.clone(), slow("worker-2"));
    first.ensure_group().await.unwrap();

    let producer = store.clone();
    let produce = async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let first_id = producer.append("stream:events", [("seq", "0")]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second_id = producer.append("stream:events", [("seq", "1")]).await;
        (first_id, second_id)
    };

    // Both members are blocked on an empty stream before anything arrives
    let (a, b, (first_id, second_id)) = tokio::join!(
        first.process_batch(&accept_all),
        second.process_batch(&accept_all),
        produce
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);

    let ids: HashSet<String> = a.iter().chain(b.iter()).map(|(id, _)| id.clone()).collect();
    assert_eq!(ids, HashSet::from([first_id, second_id]));
}

#[tokio::test]
async fn test_ensure_group_twice_keeps_one_group() {
    let store = Arc::new(MemoryStore::new());
    let processor = processor(&store, "worker-1");

    assert_eq!(processor.ensure_group().await.unwrap(), GroupCreation::Created);
    assert_eq!(
        processor.ensure_group().await.unwrap(),
        GroupCreation::AlreadyExists
    );
    assert_eq!(store.groups("stream:events").await, vec!["processors"]);
}

#[tokio::test]
async fn test_group_from_dollar_skips_existing_entries() {
    let store = Arc::new(MemoryStore::new());
    store.append("stream:events", [("type", "old")]).await;

    let processor = StreamProcessor::new(store.clone(), config("worker-1").with_start_id("$"));
    processor.ensure_group().await.unwrap();

    assert!(processor.process_batch(&accept_all).await.unwrap().is_empty());

    let id = store.append("stream:events", [("type", "new")]).await;
    let outcomes = processor.process_batch(&accept_all).await.unwrap();
    assert_eq!(outcomes, vec![(id, EntryOutcome::Acked)]);
}

#[tokio::test]
async fn test_reading_without_group_fails() {
    let store = Arc::new(MemoryStore::new());
    let processor = processor(&store, "worker-1");

    let err = processor.process_batch(&accept_all).await.unwrap_err();
    assert!(err.is_nogroup_error());
}

#[tokio::test]
async fn test_process_runs_until_shutdown() {
    let store = Arc::new(MemoryStore::new());
    store.append("stream:events", [("type", "click")]).await;
    store.append("stream:events", [("type", "skip")]).await;
    store.append("stream:events", [("type", "stop")]).await;

    let (tx, rx) = watch::channel(false);
    let handler = |fields: &StreamFields| -> eyre::Result<bool> {
        match fields.get("type").map(String::as_str) {
            Some("skip") => Ok(false),
            Some("stop") => {
                tx.send_replace(true);
                Ok(true)
            }
            _ => Ok(true),
        }
    };

    // Group is created by `process` itself, from the start of the stream
    let processor = processor(&store, "worker-1");
    let summary = processor.process(&handler, rx).await.unwrap();

    assert_eq!(summary.batches, 1);
    assert_eq!(summary.acked, 2);
    assert_eq!(summary.rejected, 1);
    assert_eq!(processor.pending(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_process_wakes_for_new_entries() {
    let store = Arc::new(MemoryStore::new());
    let processor = StreamProcessor::new(
        store.clone(),
        config("worker-1").with_block_timeout(Duration::from_secs(5)),
    );
    processor.ensure_group().await.unwrap();

    let producer = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        producer.append("stream:events", [("type", "late")]).await;
    });

    let outcomes = processor.process_batch(&accept_all).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].1, EntryOutcome::Acked);
}
