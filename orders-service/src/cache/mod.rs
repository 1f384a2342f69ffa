//! Result cache
//!
//! Read-through accelerator keyed by the external order id. The cache is never
//! the system of record: it is written only after a durable store write, and
//! every failure here is reported by the caller and otherwise ignored.
//!
//! - [`redis::RedisCache`] - Redis over a multiplexed connection manager
//! - [`memory::MemoryCache`] - in-process map with per-entry expiry

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use shared::Order;

pub use memory::MemoryCache;
pub use self::redis::RedisCache;

/// Key prefix of cached order snapshots
pub const KEY_PREFIX: &str = "order:";

/// Default snapshot lifetime (24h)
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key of an order snapshot
pub fn cache_key(order_id: &str) -> String {
    format!("{KEY_PREFIX}{order_id}")
}

/// Cache failure. Never fatal to the surrounding operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// Backend unreachable or command failed
    #[error("cache backend error: {0}")]
    Backend(String),

    /// Snapshot could not be encoded, or the cached value could not be decoded
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Key-value store of serialized order snapshots
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Unconditionally overwrite the snapshot of `order.order_id`, expiring after `ttl`
    async fn populate(&self, order: &Order, ttl: Duration) -> Result<(), CacheError>;

    /// Cached snapshot, `None` on miss
    async fn lookup(&self, order_id: &str) -> Result<Option<Order>, CacheError>;

    /// Remove the snapshot of `order_id` (no-op when absent)
    async fn invalidate(&self, order_id: &str) -> Result<(), CacheError>;
}

/// Encode a snapshot the way every backend stores it
pub(crate) fn encode(order: &Order) -> Result<String, CacheError> {
    Ok(serde_json::to_string(order)?)
}

pub(crate) fn decode(raw: &str) -> Result<Order, CacheError> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key("ORD-1"), "order:ORD-1");
    }

    #[test]
    fn test_default_ttl_is_one_day() {
        assert_eq!(DEFAULT_TTL.as_secs(), 86_400);
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        let err = decode("{not json").unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
