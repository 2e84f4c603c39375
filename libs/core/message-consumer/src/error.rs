//! Consumer error types
//!
//! Only faults that escape a consumer loop are errors. A bad payload or a
//! failing handler is reported as an outcome (`QueueOutcome`, `EntryOutcome`)
//! and never terminates the loop.

use thiserror::Error;

/// Errors raised by the store adapters and the consumer loops.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failure reported by a non-Redis store adapter
    #[error("Store error: {0}")]
    Store(String),

    /// The consumer group does not exist on the stream
    #[error("Consumer group '{group}' does not exist on '{stream}'")]
    NoGroup { stream: String, group: String },

    /// Invalid consumer configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConsumerError {
    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        ConsumerError::Store(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        ConsumerError::Config(message.into())
    }

    /// Check if the error means the store could not be reached
    pub fn is_connection_error(&self) -> bool {
        match self {
            ConsumerError::Redis(e) => e.is_io_error() || e.is_connection_dropped(),
            _ => false,
        }
    }

    /// Check if the error is a missing consumer group
    pub fn is_nogroup_error(&self) -> bool {
        match self {
            ConsumerError::NoGroup { .. } => true,
            ConsumerError::Redis(e) => e.to_string().contains("NOGROUP"),
            _ => false,
        }
    }
}

pub type ConsumerResult<T> = Result<T, ConsumerError>;
