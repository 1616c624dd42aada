// src/store/redis.rs

use super::KeyValueStore;
use crate::error::BoxError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

/// A `KeyValueStore` backed by Redis.
///
/// Keys are stored under an optional prefix so several hubs can share one server.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    prefix: String,
}

impl RedisStore {
    /// Connects to the Redis server at `url`, e.g. `redis://127.0.0.1/`.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, BoxError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        debug!("Connected to Redis token store.");
        Ok(Self {
            connection,
            prefix: prefix.into(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
        // Multiplexed connections are cheap to clone.
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(self.full_key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), BoxError> {
        let mut conn = self.connection.clone();
        let _: () = conn.set(self.full_key(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(self.full_key(key)).await?;
        Ok(())
    }
}
