//! Stream entries and pending-set records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field mapping of a stream entry (keys are unique).
pub type StreamFields = HashMap<String, String>;

/// A single stream entry as delivered to a consumer group member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Redis stream entry ID (e.g., "1234567890123-0")
    pub id: String,

    /// Entry fields
    pub fields: StreamFields,
}

impl StreamEntry {
    /// Create a new StreamEntry
    pub fn new(id: impl Into<String>, fields: StreamFields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Get a field value
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// When the entry was appended, parsed from its ID.
    ///
    /// Stream IDs are in format "timestamp_ms-sequence". Returns `None` for
    /// IDs that do not follow it.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.id
            .split('-')
            .next()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Age of the entry in milliseconds
    pub fn age_ms(&self) -> Option<i64> {
        self.timestamp()
            .map(|ts| (Utc::now() - ts).num_milliseconds())
    }
}

/// An entry delivered to a group member and not yet acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Stream entry ID
    pub id: String,

    /// Consumer the entry was delivered to
    pub consumer: String,

    /// Milliseconds since the last delivery
    pub idle_ms: u64,

    /// Number of times the entry was delivered
    pub delivery_count: u64,
}
