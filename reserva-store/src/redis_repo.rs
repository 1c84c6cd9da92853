use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use reserva_core::cache::{AtomicCache, CacheError};
use std::time::Duration;
use tracing::info;

/// Redis-backed shared cache. The connection is established once at
/// startup and injected into the components that need it; there is no
/// lazy connect-on-first-use.
#[derive(Clone)]
pub struct RedisClient {
    conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn connect(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }

    /// SET NX PX: claims the key only if no unexpired value exists.
    pub async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET").arg(key).query_async(&mut conn).await
    }

    pub async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
    }

    /// Compare-and-delete as one server-side script. A read-then-delete
    /// pair would reopen the race this call exists to close: the key can
    /// expire and be re-acquired between the two steps.
    pub async fn delete_if_equals(&self, key: &str, value: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
              return redis.call("DEL", KEYS[1])
            end
            return 0
            "#,
        );
        let _deleted: i64 = script.key(key).arg(value).invoke_async(&mut conn).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl AtomicCache for RedisClient {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        RedisClient::set_if_absent(self, key, value, ttl)
            .await
            .map_err(|e| CacheError(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        RedisClient::get(self, key)
            .await
            .map_err(|e| CacheError(e.to_string()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        RedisClient::put(self, key, value, ttl)
            .await
            .map_err(|e| CacheError(e.to_string()))
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<(), CacheError> {
        RedisClient::delete_if_equals(self, key, value)
            .await
            .map_err(|e| CacheError(e.to_string()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        RedisClient::ping(self)
            .await
            .map_err(|e| CacheError(e.to_string()))
    }
}
