//! Redis connection setup

use crate::retry::{RetryConfig, retry_with_backoff};
use core_config::redis::RedisConfig;
use redis::Client;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tracing::info;

/// Settings for the managers handed to `RedisStore`.
///
/// BLPOP and XREADGROUP BLOCK hold the connection for up to `pop_timeout` or
/// `block_timeout`, so the manager must not apply a response timeout of its
/// own. Those commands are bounded by the timeout they carry.
pub fn manager_config() -> ConnectionManagerConfig {
    ConnectionManagerConfig::new().set_response_timeout(None)
}

/// Connect to Redis and verify the connection with PING.
///
/// The returned `ConnectionManager` reconnects on its own after the
/// connection drops. It has no response timeout (see [`manager_config`]).
pub async fn connect(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    info!(
        host = %config.host,
        port = config.port,
        database = config.database,
        from_url = config.url.is_some(),
        "Connecting to Redis"
    );

    let client = Client::open(config.connection_url())?;
    let manager = ConnectionManager::new_with_config(client, manager_config()).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Connect to Redis, retrying with exponential backoff.
///
/// Meant for startup, when Redis may still be coming up. Uses
/// `RetryConfig::default()` when `retry` is `None`.
pub async fn connect_with_retry(
    config: &RedisConfig,
    retry: Option<RetryConfig>,
) -> redis::RedisResult<ConnectionManager> {
    let retry = retry.unwrap_or_default();
    retry_with_backoff(|| connect(config), &retry).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_connection_url_credentials_survive_parsing() {
        use redis::IntoConnectionInfo;

        let config = RedisConfig::new("cache.internal", 6379)
            .with_auth(Some("svc@ops".to_string()), Some("p@ss/w#rd".to_string()));
        let info = config.connection_url().into_connection_info().unwrap();

        assert_eq!(info.redis_settings().username(), Some("svc@ops"));
        assert_eq!(info.redis_settings().password(), Some("p@ss/w#rd"));
        assert_eq!(info.redis_settings().db(), 0);
    }

    #[tokio::test]
    async fn test_connect_invalid_url() {
        let config = RedisConfig::from_url("not-a-redis-url");
        assert!(connect(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let config = RedisConfig::from_url("not-a-redis-url");
        let retry = RetryConfig::new()
            .with_max_retries(1)
            .with_initial_delay(Duration::from_millis(1))
            .without_jitter();

        assert!(connect_with_retry(&config, Some(retry)).await.is_err());
    }
}
