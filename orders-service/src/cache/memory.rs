//! In-memory result cache
//!
//! Stores the same serialized JSON a Redis deployment would, so decode
//! failures behave identically. Expired entries are dropped lazily on lookup.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use shared::Order;

use super::{CacheError, ResultCache, cache_key, decode, encode};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`ResultCache`]
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    unavailable: AtomicBool,
    /// Injected latency per operation, in milliseconds
    delay_ms: AtomicU64,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a backend error (or recover)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every operation sleep for `delay` first (`Duration::ZERO` to recover)
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Store a raw value under `key`, bypassing serialization
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Raw value under `key`, if present and not expired
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_raw(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of successful populate calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), CacheError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("injected: connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn populate(&self, order: &Order, ttl: Duration) -> Result<(), CacheError> {
        self.enter().await?;
        let value = encode(order)?;
        self.insert_raw(cache_key(&order.order_id), value, ttl);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn lookup(&self, order_id: &str) -> Result<Option<Order>, CacheError> {
        self.enter().await?;
        let key = cache_key(order_id);

        // Release the shard guard before `remove`
        let entry = self.entries.get(&key).map(|entry| entry.value().clone());
        let Some(entry) = entry else {
            return Ok(None);
        };
        if entry.expires_at <= Instant::now() {
            self.entries.remove(&key);
            return Ok(None);
        }

        decode(&entry.value).map(Some)
    }

    async fn invalidate(&self, order_id: &str) -> Result<(), CacheError> {
        self.enter().await?;
        self.entries.remove(&cache_key(order_id));
        Ok(())
    }
}
