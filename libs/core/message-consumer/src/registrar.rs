//! Consumer group registration.
//!
//! A group must exist before its members can read. Registration is
//! idempotent: a group that already exists is reported as
//! `GroupCreation::AlreadyExists` and every process can register on start.

use crate::error::ConsumerResult;
use crate::metrics;
use crate::store::{GroupCreation, StreamStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Which group to create on which stream, and from where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    /// Redis key of the stream
    pub stream: String,
    /// Consumer group name
    pub group: String,
    /// ID the group starts after ("0" = whole stream, "$" = only new entries)
    pub start_id: String,
    /// Create the stream if it does not exist
    pub create_stream_if_missing: bool,
}

impl GroupSpec {
    /// Group starting at "0", creating the stream when missing
    pub fn new(stream: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            start_id: "0".to_string(),
            create_stream_if_missing: true,
        }
    }

    pub fn with_start_id(mut self, start_id: impl Into<String>) -> Self {
        self.start_id = start_id.into();
        self
    }

    pub fn with_create_stream(mut self, create: bool) -> Self {
        self.create_stream_if_missing = create;
        self
    }
}

/// Ensures consumer groups exist
pub struct GroupRegistrar<S> {
    store: Arc<S>,
}

impl<S> Clone for GroupRegistrar<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: StreamStore> GroupRegistrar<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the group unless it already exists.
    ///
    /// Errors other than "group already exists" (unreachable store, missing
    /// stream without `create_stream_if_missing`, invalid start ID) propagate.
    pub async fn ensure_group(&self, spec: &GroupSpec) -> ConsumerResult<GroupCreation> {
        let creation = self
            .store
            .create_group(
                &spec.stream,
                &spec.group,
                &spec.start_id,
                spec.create_stream_if_missing,
            )
            .await?;

        match creation {
            GroupCreation::Created => {
                info!(
                    stream = %spec.stream,
                    group = %spec.group,
                    start_id = %spec.start_id,
                    "Created consumer group"
                );
            }
            GroupCreation::AlreadyExists => {
                debug!(
                    stream = %spec.stream,
                    group = %spec.group,
                    "Consumer group already exists"
                );
            }
        }

        metrics::record_group_creation(&spec.stream, creation);
        Ok(creation)
    }
}
