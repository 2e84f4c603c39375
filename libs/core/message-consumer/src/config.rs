//! Consumer configuration
//!
//! `QueueConfig` configures the work-queue consumer, `StreamConfig` the
//! consumer-group stream processor. Both load from the environment through
//! `core_config::FromEnv` and expose `with_*` builders.

use crate::error::{ConsumerError, ConsumerResult};
use crate::keys::KeySpace;
use crate::registrar::GroupSpec;
use core_config::{env_or_default, env_parse_or, ConfigError, FromEnv};
use std::time::Duration;
use uuid::Uuid;

/// Configuration for the work-queue consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Queue name (the Redis key is `queue:<name>`)
    pub queue_name: String,

    /// How long each blocking pop waits before the shutdown flag is re-checked
    ///
    /// Connections from `connect` have no response timeout, so any value
    /// above zero is honoured.
    pub pop_timeout: Duration,

    /// Key naming for the queue and its dead-letter queue
    pub keys: KeySpace,
}

impl QueueConfig {
    /// Create a new QueueConfig with the default 30s pop timeout
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            pop_timeout: Duration::from_secs(30),
            keys: KeySpace::default(),
        }
    }

    /// Set the pop timeout
    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    /// Set the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keys = KeySpace::new(prefix);
        self
    }

    /// Redis key of the work queue
    pub fn queue_key(&self) -> String {
        self.keys.queue(&self.queue_name)
    }

    /// Redis key of the dead-letter queue
    pub fn dlq_key(&self) -> String {
        self.keys.dlq(&self.queue_name)
    }

    /// Check the configuration before starting a consumer.
    ///
    /// A zero timeout is rejected: Redis treats it as "block forever", and the
    /// loop would never observe shutdown.
    pub fn validate(&self) -> ConsumerResult<()> {
        if self.queue_name.is_empty() {
            return Err(ConsumerError::config("queue name must not be empty"));
        }
        if self.pop_timeout.is_zero() {
            return Err(ConsumerError::config("pop timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new("tasks")
    }
}

impl FromEnv for QueueConfig {
    /// Reads from environment variables:
    /// - QUEUE_NAME: defaults to "tasks"
    /// - QUEUE_POP_TIMEOUT_SECS: defaults to 30
    /// - REDIS_KEY_PREFIX: defaults to none
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs: u64 = env_parse_or("QUEUE_POP_TIMEOUT_SECS", 30)?;

        Ok(Self::new(env_or_default("QUEUE_NAME", "tasks"))
            .with_pop_timeout(Duration::from_secs(timeout_secs))
            .with_key_prefix(env_or_default("REDIS_KEY_PREFIX", "")))
    }
}

/// Configuration for the consumer-group stream processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Stream name (the Redis key is `stream:<name>`)
    pub stream_name: String,

    /// Consumer group name
    pub group: String,

    /// Consumer name within the group.
    ///
    /// Entries left pending stay attached to this name, so set it explicitly
    /// when a restarted process should own its previous pending entries.
    pub consumer: String,

    /// ID the group starts after when it is first created ("0" = whole stream)
    pub start_id: String,

    /// Create the stream if it does not exist when creating the group
    pub create_stream_if_missing: bool,

    /// Maximum entries per read
    pub batch_size: usize,

    /// How long each read blocks when no entries are available
    ///
    /// Connections from `connect` have no response timeout, so any value
    /// above zero is honoured.
    pub block_timeout: Duration,

    /// Key naming for the stream
    pub keys: KeySpace,
}

impl StreamConfig {
    /// Create a new StreamConfig with a generated consumer name
    pub fn new(stream_name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            group: group.into(),
            consumer: format!("worker-{}", Uuid::new_v4()),
            start_id: "0".to_string(),
            create_stream_if_missing: true,
            batch_size: 10,
            block_timeout: Duration::from_millis(5000),
            keys: KeySpace::default(),
        }
    }

    /// Set the consumer name
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// Set the group start ID
    pub fn with_start_id(mut self, start_id: impl Into<String>) -> Self {
        self.start_id = start_id.into();
        self
    }

    /// Create the stream when missing (MKSTREAM)
    pub fn with_create_stream(mut self, create: bool) -> Self {
        self.create_stream_if_missing = create;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the blocking read timeout
    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    /// Set the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keys = KeySpace::new(prefix);
        self
    }

    /// Redis key of the stream
    pub fn stream_key(&self) -> String {
        self.keys.stream(&self.stream_name)
    }

    /// Group registration for this stream
    pub fn group_spec(&self) -> GroupSpec {
        GroupSpec::new(self.stream_key(), &self.group)
            .with_start_id(&self.start_id)
            .with_create_stream(self.create_stream_if_missing)
    }

    /// Check the configuration before starting a processor
    pub fn validate(&self) -> ConsumerResult<()> {
        if self.stream_name.is_empty() {
            return Err(ConsumerError::config("stream name must not be empty"));
        }
        if self.group.is_empty() {
            return Err(ConsumerError::config("consumer group must not be empty"));
        }
        if self.consumer.is_empty() {
            return Err(ConsumerError::config("consumer name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(ConsumerError::config("batch size must be greater than zero"));
        }
        if self.block_timeout.is_zero() {
            return Err(ConsumerError::config("block timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new("events", "processors")
    }
}

impl FromEnv for StreamConfig {
    /// Reads from environment variables:
    /// - STREAM_NAME: defaults to "events"
    /// - STREAM_GROUP: defaults to "processors"
    /// - STREAM_CONSUMER: defaults to a generated `worker-<uuid>`
    /// - STREAM_START_ID: defaults to "0"
    /// - STREAM_CREATE_IF_MISSING: defaults to true
    /// - STREAM_BATCH_SIZE: defaults to 10
    /// - STREAM_BLOCK_MS: defaults to 5000
    /// - REDIS_KEY_PREFIX: defaults to none
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(
            env_or_default("STREAM_NAME", "events"),
            env_or_default("STREAM_GROUP", "processors"),
        );

        if let Ok(consumer) = std::env::var("STREAM_CONSUMER") {
            config = config.with_consumer(consumer);
        }

        let block_ms: u64 = env_parse_or("STREAM_BLOCK_MS", 5000)?;

        Ok(config
            .with_start_id(env_or_default("STREAM_START_ID", "0"))
            .with_create_stream(env_parse_or("STREAM_CREATE_IF_MISSING", true)?)
            .with_batch_size(env_parse_or("STREAM_BATCH_SIZE", 10)?)
            .with_block_timeout(Duration::from_millis(block_ms))
            .with_key_prefix(env_or_default("REDIS_KEY_PREFIX", "")))
    }
}
