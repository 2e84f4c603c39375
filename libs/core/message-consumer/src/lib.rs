//! Message Consumer
//!
//! Two ways of consuming background work from Redis.
//!
//! ## Features
//!
//! - **Work queue**: `QueueConsumer` pops JSON messages from `queue:<name>`
//!   and routes anything it cannot process to `dlq:<name>`, byte for byte
//! - **Consumer groups**: `StreamProcessor` reads new entries from
//!   `stream:<name>`, acknowledges processed ones and leaves failures pending
//! - **Idempotent setup**: `GroupRegistrar` creates groups and treats
//!   `BUSYGROUP` as success
//! - **Swappable store**: `RedisStore` for production, `MemoryStore` for tests
//!   (behind the `memory` feature)
//! - **Prometheus metrics**: per-outcome counters
//!
//! ## Example
//!
//! ```ignore
//! use core_config::{FromEnv, redis::RedisConfig};
//! use message_consumer::{
//!     RedisStore, StreamConfig, StreamFields, StreamProcessor, connect_with_retry,
//!     shutdown_channel,
//! };
//! use std::sync::Arc;
//!
//! let redis = connect_with_retry(&RedisConfig::from_env()?, None).await?;
//! let store = Arc::new(RedisStore::new(redis));
//!
//! let processor = StreamProcessor::new(store, StreamConfig::from_env()?);
//! let handler = |fields: &StreamFields| -> eyre::Result<bool> {
//!     tracing::info!(?fields, "Processing event");
//!     Ok(true)
//! };
//!
//! processor.process(&handler, shutdown_channel()).await?;
//! ```

mod config;
mod connector;
mod dlq;
mod entry;
mod error;
mod handler;
mod keys;
pub mod metrics;
mod processor;
mod queue;
mod registrar;
pub mod retry;
mod shutdown;
pub mod store;

// Re-export main types
pub use config::{QueueConfig, StreamConfig};
pub use connector::{connect, connect_with_retry, manager_config};
pub use dlq::DeadLetterRouter;
pub use entry::{PendingEntry, StreamEntry, StreamFields};
pub use error::{ConsumerError, ConsumerResult};
pub use handler::{HandlerFailure, MessageHandler};
pub use keys::{KeyKind, KeySpace};
pub use metrics::{init_metrics, render_metrics};
pub use processor::{EntryOutcome, ProcessSummary, StreamProcessor};
pub use queue::{ConsumeSummary, QueueConsumer, QueueOutcome};
pub use registrar::{GroupRegistrar, GroupSpec};
pub use retry::RetryConfig;
pub use shutdown::{shutdown_channel, shutdown_signal};
pub use store::{GroupCreation, QueueStore, RedisStore, StreamStore};

#[cfg(any(test, feature = "memory"))]
pub use store::MemoryStore;
