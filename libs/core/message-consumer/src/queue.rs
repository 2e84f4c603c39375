//! Work-queue consumer
//!
//! Pops JSON messages from `queue:<name>`, hands each one to a handler, and
//! sends anything that cannot be decoded or is not processed to
//! `dlq:<name>`.
//!
//! The pop is destructive: once a message is taken it is either processed or
//! dead-lettered, and a crash in between loses it. Delivery is at-most-once
//! from the queue's point of view.
//!
//! ```rust,ignore
//! let store = Arc::new(RedisStore::new(connect(&redis_config).await?));
//! let consumer = QueueConsumer::new(store, QueueConfig::new("tasks"));
//!
//! let handler = |task: &serde_json::Value| -> eyre::Result<bool> {
//!     tracing::info!(?task, "Processing");
//!     Ok(true)
//! };
//!
//! consumer.consume(&handler, shutdown_channel()).await?;
//! ```

use crate::config::QueueConfig;
use crate::dlq::{DeadLetterRouter, preview};
use crate::error::ConsumerResult;
use crate::handler::{self, HandlerFailure, MessageHandler};
use crate::metrics;
use crate::store::QueueStore;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use strum::AsRefStr;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What happened to one popped message
#[derive(Debug, Clone, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum QueueOutcome {
    /// Decoded and processed by the handler
    Delivered,
    /// The payload was not valid JSON for the message type
    DecodeFailed(String),
    /// The handler rejected the message, returned an error or panicked
    HandlerFailed(HandlerFailure),
}

impl QueueOutcome {
    /// Whether the message belongs in the DLQ
    pub fn is_dead_letter(&self) -> bool {
        !matches!(self, QueueOutcome::Delivered)
    }
}

/// Totals for one `consume` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
    /// Messages processed by the handler
    pub delivered: u64,
    /// Messages written to the DLQ
    pub dead_lettered: u64,
    /// Messages that should have gone to the DLQ but could not be written
    pub dlq_failures: u64,
    /// Pops that timed out without a message
    pub timeouts: u64,
}

/// How a failed message was routed
enum Routing {
    NotNeeded,
    DeadLettered,
    Failed,
}

/// Consumes one work queue
pub struct QueueConsumer<S> {
    store: Arc<S>,
    config: QueueConfig,
    dead_letters: DeadLetterRouter<S>,
}

impl<S: QueueStore> QueueConsumer<S> {
    /// Create a new QueueConsumer
    pub fn new(store: Arc<S>, config: QueueConfig) -> Self {
        let dead_letters = DeadLetterRouter::new(store.clone(), config.keys.clone());
        Self {
            store,
            config,
            dead_letters,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Router for this consumer's DLQ, for inspection and purging
    pub fn dead_letters(&self) -> &DeadLetterRouter<S> {
        &self.dead_letters
    }

    /// Decode `raw` and run the handler on it.
    ///
    /// Does not touch the store; the caller routes non-delivered payloads.
    pub fn dispatch<T, H>(&self, raw: &[u8], handler: &H) -> QueueOutcome
    where
        T: DeserializeOwned,
        H: MessageHandler<T> + ?Sized,
    {
        let message: T = match serde_json::from_slice(raw) {
            Ok(message) => message,
            Err(e) => return QueueOutcome::DecodeFailed(e.to_string()),
        };

        match handler::invoke(handler, &message) {
            Ok(()) => QueueOutcome::Delivered,
            Err(failure) => QueueOutcome::HandlerFailed(failure),
        }
    }

    /// Pop one message, dispatch it, and dead-letter it when needed.
    ///
    /// Returns `None` when the pop timed out. Store errors from the pop
    /// propagate; a failed DLQ write is logged and does not.
    pub async fn consume_one<T, H>(&self, handler: &H) -> ConsumerResult<Option<QueueOutcome>>
    where
        T: DeserializeOwned,
        H: MessageHandler<T> + ?Sized,
    {
        Ok(self.step(handler).await?.map(|(outcome, _)| outcome))
    }

    /// Consume messages until `shutdown` turns true.
    ///
    /// Shutdown is checked between pops, so the longest wait is one pop
    /// timeout. A handler that is running is never interrupted.
    pub async fn consume<T, H>(
        &self,
        handler: &H,
        shutdown: watch::Receiver<bool>,
    ) -> ConsumerResult<ConsumeSummary>
    where
        T: DeserializeOwned,
        H: MessageHandler<T> + ?Sized,
    {
        self.config.validate()?;

        info!(
            queue = %self.config.queue_name,
            key = %self.config.queue_key(),
            timeout_secs = self.config.pop_timeout.as_secs_f64(),
            "Starting queue consumer"
        );

        let mut summary = ConsumeSummary::default();

        loop {
            if *shutdown.borrow() {
                info!(queue = %self.config.queue_name, "Shutdown requested, stopping consumer");
                break;
            }

            match self.step(handler).await? {
                None => summary.timeouts += 1,
                Some((outcome, routing)) => {
                    if outcome == QueueOutcome::Delivered {
                        summary.delivered += 1;
                    }
                    match routing {
                        Routing::NotNeeded => {}
                        Routing::DeadLettered => summary.dead_lettered += 1,
                        Routing::Failed => summary.dlq_failures += 1,
                    }
                }
            }
        }

        info!(
            queue = %self.config.queue_name,
            delivered = summary.delivered,
            dead_lettered = summary.dead_lettered,
            dlq_failures = summary.dlq_failures,
            "Queue consumer stopped"
        );

        Ok(summary)
    }

    async fn step<T, H>(&self, handler: &H) -> ConsumerResult<Option<(QueueOutcome, Routing)>>
    where
        T: DeserializeOwned,
        H: MessageHandler<T> + ?Sized,
    {
        let queue = &self.config.queue_name;
        let queue_key = self.config.queue_key();

        let raw = match self.store.blocking_pop(&queue_key, self.config.pop_timeout).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(queue = %queue, "No message before timeout");
                return Ok(None);
            }
            Err(e) => {
                error!(queue = %queue, error = %e, "Failed to pop from queue");
                return Err(e);
            }
        };

        let outcome = self.dispatch(&raw, handler);
        metrics::record_queue_outcome(queue, &outcome);

        match &outcome {
            QueueOutcome::Delivered => {
                debug!(queue = %queue, payload = %preview(&raw), "Processed message");
            }
            QueueOutcome::DecodeFailed(reason) => {
                warn!(
                    queue = %queue,
                    error = %reason,
                    payload = %preview(&raw),
                    "Failed to decode message"
                );
            }
            QueueOutcome::HandlerFailed(HandlerFailure::Rejected) => {
                warn!(queue = %queue, payload = %preview(&raw), "Handler rejected message");
            }
            QueueOutcome::HandlerFailed(HandlerFailure::Faulted(reason)) => {
                error!(
                    queue = %queue,
                    error = %reason,
                    payload = %preview(&raw),
                    "Handler failed"
                );
            }
        }

        if !outcome.is_dead_letter() {
            return Ok(Some((outcome, Routing::NotNeeded)));
        }

        let routing = match self.dead_letters.route(queue, &raw).await {
            Ok(()) => Routing::DeadLettered,
            Err(e) => {
                error!(
                    queue = %queue,
                    dlq = %self.config.dlq_key(),
                    error = %e,
                    payload = %preview(&raw),
                    "Failed to send message to DLQ, message dropped"
                );
                metrics::record_dlq_failure(queue);
                Routing::Failed
            }
        };

        Ok(Some((outcome, routing)))
    }
}
