//! Shared test utilities for consumer testing
//!
//! - `TestRedis`: Redis container with automatic cleanup (feature: "redis")
//! - `TestDataBuilder`: deterministic queue, stream and consumer names and
//!   payloads (always available)
//! - `assertions`: custom assertion helpers (always available)
//!
//! # Features
//!
//! - `redis`: Enables Redis test infrastructure
//!
//! # Usage
//!
//! Add `features = ["redis"]` to your dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["redis"] }
//! ```
//!
//! Then in your tests:
//!
//! ```rust,ignore
//! use test_utils::{TestDataBuilder, TestRedis};
//!
//! #[tokio::test]
//! #[ignore = "requires Docker"]
//! async fn my_redis_test() {
//!     let redis = TestRedis::new().await;
//!     let manager = redis.connection_manager().await;
//!     let builder = TestDataBuilder::from_test_name("my_redis_test");
//!
//!     let queue = builder.queue_name("main");
//!     // ...
//! }
//! ```

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// Builder for test data with deterministic names
///
/// Tests sharing one Redis instance stay isolated by deriving their key names
/// from the test name.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_dead_letters");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Generate a unique name for testing
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.name("queue", "main"), "test-queue-7-main");
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// Queue name (without the `queue:` key prefix)
    pub fn queue_name(&self, suffix: &str) -> String {
        self.name("queue", suffix)
    }

    /// Stream name (without the `stream:` key prefix)
    pub fn stream_name(&self, suffix: &str) -> String {
        self.name("stream", suffix)
    }

    /// Consumer group name
    pub fn group_name(&self, suffix: &str) -> String {
        self.name("group", suffix)
    }

    /// Consumer name, numbered within the test
    pub fn consumer_name(&self, index: usize) -> String {
        self.name("consumer", &index.to_string())
    }

    /// JSON task payload carrying `id` and this builder's seed
    pub fn task_payload(&self, id: u64) -> Vec<u8> {
        format!(r#"{{"id":{},"seed":{},"action":"ship"}}"#, id, self.seed).into_bytes()
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that two payloads are byte-identical, printing both lossily on failure
    pub fn assert_bytes_eq(actual: &[u8], expected: &[u8], context: &str) {
        assert!(
            actual == expected,
            "{}: expected {:?}, got {:?}",
            context,
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(actual)
        );
    }

    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.queue_name("main"), builder2.queue_name("main"));
        assert_eq!(builder1.task_payload(1), builder2.task_payload(1));
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.stream_name("events"), builder2.stream_name("events"));
    }

    #[test]
    fn test_names() {
        let builder = TestDataBuilder::new(3);

        assert_eq!(builder.queue_name("tasks"), "test-queue-3-tasks");
        assert_eq!(builder.group_name("workers"), "test-group-3-workers");
        assert_eq!(builder.consumer_name(1), "test-consumer-3-1");
        assert_ne!(builder.consumer_name(1), builder.consumer_name(2));
    }

    #[test]
    fn test_task_payload_is_json() {
        let payload = TestDataBuilder::new(5).task_payload(9);
        assert_eq!(payload, br#"{"id":9,"seed":5,"action":"ship"}"#.to_vec());
    }

    #[test]
    #[should_panic(expected = "dlq contents")]
    fn test_assert_bytes_eq_fails() {
        assertions::assert_bytes_eq(b"a", b"b", "dlq contents");
    }
}
