//! Redis result cache
//!
//! `SET key value EX ttl` / `GET key` / `DEL key` over a
//! [`ConnectionManager`], which multiplexes one connection and reconnects on
//! failure. Cloning the manager is cheap, so no lock is held across commands.

use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use shared::Order;

use super::{CacheError, ResultCache, cache_key, decode, encode};

impl From<::redis::RedisError> for CacheError {
    fn from(e: ::redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

/// Redis-backed [`ResultCache`]
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to `redis_url` (`redis://[:password@]host:port/db`)
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::debug!("Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn populate(&self, order: &Order, ttl: Duration) -> Result<(), CacheError> {
        let value = encode(order)?;
        // EX 0 is rejected by Redis
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(cache_key(&order.order_id), value, seconds).await?;
        Ok(())
    }

    async fn lookup(&self, order_id: &str) -> Result<Option<Order>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(cache_key(order_id)).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn invalidate(&self, order_id: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(cache_key(order_id)).await?;
        Ok(())
    }
}
