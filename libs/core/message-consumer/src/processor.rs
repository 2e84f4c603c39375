//! Consumer-group stream processor
//!
//! Reads never-delivered entries from `stream:<name>` as one member of a
//! consumer group and acknowledges each entry the handler processes.
//! Entries the handler rejects or fails on stay in the consumer's pending
//! set. They are not retried or reclaimed here; use [`StreamProcessor::pending`]
//! to inspect them.

use crate::config::StreamConfig;
use crate::entry::{PendingEntry, StreamEntry, StreamFields};
use crate::error::ConsumerResult;
use crate::handler::{self, HandlerFailure, MessageHandler};
use crate::metrics;
use crate::registrar::GroupRegistrar;
use crate::store::{GroupCreation, StreamStore};
use std::sync::Arc;
use strum::AsRefStr;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What happened to one stream entry
#[derive(Debug, Clone, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EntryOutcome {
    /// Processed and acknowledged
    Acked,
    /// The handler returned `false`; the entry stays pending
    Rejected,
    /// The handler returned an error or panicked; the entry stays pending
    Faulted(String),
    /// Processed, but the acknowledgement failed; the entry stays pending
    AckFailed(String),
}

/// Totals for one `process` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Non-empty batches read
    pub batches: u64,
    pub acked: u64,
    pub rejected: u64,
    pub faulted: u64,
    pub ack_failures: u64,
}

impl ProcessSummary {
    fn record(&mut self, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::Acked => self.acked += 1,
            EntryOutcome::Rejected => self.rejected += 1,
            EntryOutcome::Faulted(_) => self.faulted += 1,
            EntryOutcome::AckFailed(_) => self.ack_failures += 1,
        }
    }
}

/// Processes one stream as a member of a consumer group
pub struct StreamProcessor<S> {
    store: Arc<S>,
    config: StreamConfig,
    registrar: GroupRegistrar<S>,
}

impl<S: StreamStore> StreamProcessor<S> {
    /// Create a new StreamProcessor
    pub fn new(store: Arc<S>, config: StreamConfig) -> Self {
        let registrar = GroupRegistrar::new(store.clone());
        Self {
            store,
            config,
            registrar,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Redis key of the processed stream
    pub fn stream_key(&self) -> String {
        self.config.stream_key()
    }

    /// Create the consumer group unless it already exists
    pub async fn ensure_group(&self) -> ConsumerResult<GroupCreation> {
        self.registrar.ensure_group(&self.config.group_spec()).await
    }

    /// Read one batch of new entries and handle them in order.
    ///
    /// Returns each entry ID with its outcome; an empty batch means the read
    /// timed out. Read errors propagate. Ack errors are reported as
    /// `EntryOutcome::AckFailed`.
    pub async fn process_batch<H>(&self, handler: &H) -> ConsumerResult<Vec<(String, EntryOutcome)>>
    where
        H: MessageHandler<StreamFields> + ?Sized,
    {
        let stream = self.stream_key();

        let entries = self
            .store
            .read_new(
                &stream,
                &self.config.group,
                &self.config.consumer,
                self.config.batch_size,
                self.config.block_timeout,
            )
            .await
            .map_err(|e| {
                error!(stream = %stream, group = %self.config.group, error = %e, "Failed to read from stream");
                e
            })?;

        if entries.is_empty() {
            return Ok(Vec::new());
        }

        debug!(stream = %stream, count = entries.len(), "Read batch");
        metrics::record_batch_size(&stream, entries.len());

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let outcome = self.handle_entry(&stream, &entry, handler).await;
            metrics::record_entry_outcome(&stream, &outcome);
            outcomes.push((entry.id, outcome));
        }

        Ok(outcomes)
    }

    async fn handle_entry<H>(&self, stream: &str, entry: &StreamEntry, handler: &H) -> EntryOutcome
    where
        H: MessageHandler<StreamFields> + ?Sized,
    {
        match handler::invoke(handler, &entry.fields) {
            Ok(()) => {}
            Err(HandlerFailure::Rejected) => {
                warn!(stream = %stream, entry_id = %entry.id, "Handler rejected entry, leaving it pending");
                return EntryOutcome::Rejected;
            }
            Err(HandlerFailure::Faulted(reason)) => {
                error!(
                    stream = %stream,
                    entry_id = %entry.id,
                    error = %reason,
                    "Handler failed, leaving entry pending"
                );
                return EntryOutcome::Faulted(reason);
            }
        }

        match self.store.ack(stream, &self.config.group, &entry.id).await {
            Ok(0) => {
                debug!(stream = %stream, entry_id = %entry.id, "Entry was already acknowledged");
                EntryOutcome::Acked
            }
            Ok(_) => {
                debug!(stream = %stream, entry_id = %entry.id, "Acknowledged entry");
                EntryOutcome::Acked
            }
            Err(e) => {
                error!(
                    stream = %stream,
                    entry_id = %entry.id,
                    error = %e,
                    "Failed to acknowledge entry, leaving it pending"
                );
                EntryOutcome::AckFailed(e.to_string())
            }
        }
    }

    /// Process entries until `shutdown` turns true.
    ///
    /// Registers the group first. Shutdown is checked between batches, so
    /// the longest wait is one block timeout; a batch in progress always
    /// finishes.
    pub async fn process<H>(
        &self,
        handler: &H,
        shutdown: watch::Receiver<bool>,
    ) -> ConsumerResult<ProcessSummary>
    where
        H: MessageHandler<StreamFields> + ?Sized,
    {
        self.config.validate()?;
        self.ensure_group().await?;

        info!(
            stream = %self.stream_key(),
            group = %self.config.group,
            consumer = %self.config.consumer,
            batch_size = self.config.batch_size,
            block_ms = self.config.block_timeout.as_millis() as u64,
            "Starting stream processor"
        );

        let mut summary = ProcessSummary::default();

        loop {
            if *shutdown.borrow() {
                info!(stream = %self.stream_key(), "Shutdown requested, stopping processor");
                break;
            }

            let outcomes = self.process_batch(handler).await?;
            if outcomes.is_empty() {
                continue;
            }

            summary.batches += 1;
            for (_, outcome) in &outcomes {
                summary.record(outcome);
            }
        }

        info!(
            stream = %self.stream_key(),
            consumer = %self.config.consumer,
            acked = summary.acked,
            rejected = summary.rejected,
            faulted = summary.faulted,
            ack_failures = summary.ack_failures,
            "Stream processor stopped"
        );

        Ok(summary)
    }

    /// Up to `count` entries of the group's pending set, lowest ID first
    pub async fn pending(&self, count: usize) -> ConsumerResult<Vec<PendingEntry>> {
        self.store
            .pending(&self.stream_key(), &self.config.group, count)
            .await
    }
}
