//! Redis key naming.
//!
//! Work queues live at `queue:<name>`, their dead-letter queues at
//! `dlq:<name>` and streams at `stream:<name>`. Producers and operators rely on
//! these names, so they must not change. An optional prefix namespaces all
//! keys on a shared Redis instance (`<prefix>:queue:<name>`).

use strum::{AsRefStr, Display, EnumString};

/// Kind of key managed by the consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum KeyKind {
    /// Work queue (Redis list).
    Queue,
    /// Dead-letter queue for a work queue (Redis list).
    Dlq,
    /// Event stream (Redis stream).
    Stream,
}

/// Builds keys for queues, dead-letter queues and streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    prefix: Option<String>,
}

impl KeySpace {
    /// Create a key space with a prefix. An empty prefix means no prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches(':').to_string();
        Self {
            prefix: (!prefix.is_empty()).then_some(prefix),
        }
    }

    /// Get the configured prefix, if any
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Key of the work queue `name`
    pub fn queue(&self, name: &str) -> String {
        self.key(KeyKind::Queue, name)
    }

    /// Key of the dead-letter queue for work queue `name`
    pub fn dlq(&self, name: &str) -> String {
        self.key(KeyKind::Dlq, name)
    }

    /// Key of the stream `name`
    pub fn stream(&self, name: &str) -> String {
        self.key(KeyKind::Stream, name)
    }

    /// Build a key of the given kind
    pub fn key(&self, kind: KeyKind, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}:{}", prefix, kind, name),
            None => format!("{}:{}", kind, name),
        }
    }
}
