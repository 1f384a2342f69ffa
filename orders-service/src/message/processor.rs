//! Order Processor
//!
//! Write path: decode → validate → transactional create → best-effort cache
//! populate → [`ProcessResult`]. Read path: cache → store → repopulate.
//!
//! Cache failures never change an outcome. They are logged, counted and
//! published on a broadcast channel ([`OrderProcessor::subscribe_cache_failures`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use shared::{Order, OrderCreate};
use tokio::sync::broadcast;
use tokio::time::{Instant, timeout_at};

use super::AckAction;
use crate::cache::{CacheError, DEFAULT_TTL, ResultCache};
use crate::db::OrderStore;
use crate::utils::validation::{validate_order_create, validate_status};
use crate::utils::{AppError, AppResult};

/// Buffered cache-failure reports per subscriber
const CACHE_FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Result of message processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// Order persisted
    Success { order_id: String },
    /// Identical order already stored (redelivery); nothing written
    Skipped { order_id: String },
    /// Transient failure, the message should be redelivered
    Retry { reason: String },
    /// Permanent failure, the message must not be redelivered
    Failed { reason: String },
}

impl ProcessResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessResult::Success { .. })
    }

    pub fn should_retry(&self) -> bool {
        matches!(self, ProcessResult::Retry { .. })
    }

    pub fn ack_action(&self) -> AckAction {
        match self {
            ProcessResult::Success { .. } | ProcessResult::Skipped { .. } => AckAction::Ack,
            ProcessResult::Retry { .. } => AckAction::Nack { requeue: true },
            ProcessResult::Failed { .. } => AckAction::Nack { requeue: false },
        }
    }

    /// Short label for logs
    pub fn outcome(&self) -> &'static str {
        match self {
            ProcessResult::Success { .. } => "success",
            ProcessResult::Skipped { .. } => "skipped",
            ProcessResult::Retry { .. } => "retry",
            ProcessResult::Failed { .. } => "failed",
        }
    }
}

/// Cache operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOp {
    Populate,
    Lookup,
    Invalidate,
}

/// A swallowed cache error
#[derive(Debug, Clone)]
pub struct CacheFailure {
    pub order_id: String,
    pub op: CacheOp,
    pub error: CacheError,
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Lifetime of every cached snapshot
    pub cache_ttl: Duration,
    /// Deadline of one processing attempt or one read
    pub operation_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_TTL,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    pub processed: u64,
    pub skipped: u64,
    pub retried: u64,
    pub rejected: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    skipped: AtomicU64,
    retried: AtomicU64,
    rejected: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Persists order events and serves cached reads
pub struct OrderProcessor {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn ResultCache>,
    config: ProcessorConfig,
    cache_failures: broadcast::Sender<CacheFailure>,
    counters: Counters,
}

impl OrderProcessor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn ResultCache>,
        config: ProcessorConfig,
    ) -> Self {
        let (cache_failures, _) = broadcast::channel(CACHE_FAILURE_CHANNEL_CAPACITY);
        Self {
            store,
            cache,
            config,
            cache_failures,
            counters: Counters::default(),
        }
    }

    /// Stream of swallowed cache errors (only those raised after subscribing)
    pub fn subscribe_cache_failures(&self) -> broadcast::Receiver<CacheFailure> {
        self.cache_failures.subscribe()
    }

    pub fn stats(&self) -> ProcessorStats {
        let c = &self.counters;
        ProcessorStats {
            processed: c.processed.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
            cache_failures: c.cache_failures.load(Ordering::Relaxed),
        }
    }

    /// Count the final outcome of a settled message
    pub fn record(&self, result: &ProcessResult) {
        let c = &self.counters;
        match result {
            ProcessResult::Success { .. } => bump(&c.processed),
            ProcessResult::Skipped { .. } => bump(&c.skipped),
            ProcessResult::Retry { .. } => bump(&c.retried),
            ProcessResult::Failed { .. } => bump(&c.rejected),
        }
    }

    // ========== Write path ==========

    /// Persist an order atomically, then populate the cache.
    ///
    /// Fails only when persistence fails; a cache failure is reported, not returned.
    pub async fn process(&self, order: &OrderCreate) -> AppResult<Order> {
        self.process_until(order, self.deadline()).await
    }

    async fn process_until(&self, order: &OrderCreate, deadline: Instant) -> AppResult<Order> {
        let items_total = order.items_total();
        if order.total_price != items_total {
            tracing::warn!(
                order_id = %order.order_id,
                total_price = %order.total_price,
                items_total = %items_total,
                "Order total does not match its items"
            );
        }

        // Missing the deadline drops the store future, which rolls back its transaction
        let stored = timeout_at(deadline, self.store.create(order))
            .await
            .map_err(|_| AppError::Timeout(self.config.operation_timeout))??;

        tracing::debug!(order_id = %stored.order_id, id = stored.id, "Order persisted");

        self.populate(&stored, deadline).await;
        Ok(stored)
    }

    /// Decode a message body and process it into an acknowledgment decision.
    ///
    /// Never fails: every error is classified into the returned result.
    pub async fn handle(&self, body: &[u8]) -> ProcessResult {
        let order = match OrderCreate::from_slice(body) {
            Ok(order) => order,
            Err(e) => {
                return ProcessResult::Failed {
                    reason: AppError::decode(e.to_string()).to_string(),
                };
            }
        };
        if let Err(e) = validate_order_create(&order) {
            return ProcessResult::Failed {
                reason: e.to_string(),
            };
        }

        let deadline = self.deadline();
        match self.process_until(&order, deadline).await {
            Ok(stored) => ProcessResult::Success {
                order_id: stored.order_id,
            },
            Err(AppError::Conflict(_)) => self.resolve_conflict(&order, deadline).await,
            Err(e) if e.is_transient() => ProcessResult::Retry {
                reason: e.to_string(),
            },
            Err(e) => ProcessResult::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// The external id is taken: an identical stored order means this is a
    /// redelivery of an already committed message.
    async fn resolve_conflict(&self, order: &OrderCreate, deadline: Instant) -> ProcessResult {
        let lookup = self.store.find_by_order_id(&order.order_id);
        let existing = match timeout_at(deadline, lookup).await {
            Ok(Ok(existing)) => existing,
            Ok(Err(e)) => {
                let e = AppError::from(e);
                return if e.is_transient() {
                    ProcessResult::Retry {
                        reason: e.to_string(),
                    }
                } else {
                    ProcessResult::Failed {
                        reason: e.to_string(),
                    }
                };
            }
            Err(_) => {
                return ProcessResult::Retry {
                    reason: AppError::Timeout(self.config.operation_timeout).to_string(),
                };
            }
        };

        match existing {
            Some(stored) if stored.matches_create(order) => {
                tracing::info!(order_id = %order.order_id, "Duplicate delivery of a stored order");
                ProcessResult::Skipped {
                    order_id: stored.order_id,
                }
            }
            Some(_) => ProcessResult::Failed {
                reason: format!(
                    "order {} already exists with different content",
                    order.order_id
                ),
            },
            // Orders are never deleted; the conflicting row is not visible yet
            None => ProcessResult::Retry {
                reason: format!("order {} conflicted but is not visible", order.order_id),
            },
        }
    }

    // ========== Read path ==========

    /// Cached snapshot, or the stored one (repopulating the cache)
    pub async fn read(&self, order_id: &str) -> AppResult<Order> {
        let deadline = self.deadline();

        match timeout_at(deadline, self.cache.lookup(order_id)).await {
            Ok(Ok(Some(order))) => {
                bump(&self.counters.cache_hits);
                tracing::debug!(order_id = %order_id, "Cache hit");
                return Ok(order);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => self.report(order_id, CacheOp::Lookup, e),
            Err(_) => self.report(order_id, CacheOp::Lookup, deadline_exceeded()),
        }
        bump(&self.counters.cache_misses);

        let stored = timeout_at(deadline, self.store.find_by_order_id(order_id))
            .await
            .map_err(|_| AppError::Timeout(self.config.operation_timeout))??
            .ok_or_else(|| AppError::not_found(order_id))?;

        self.populate(&stored, deadline).await;
        Ok(stored)
    }

    /// Change the status of a stored order and drop its cached snapshot
    pub async fn update_status(&self, order_id: &str, status: &str) -> AppResult<Order> {
        validate_status(status)?;
        let deadline = self.deadline();

        let updated = timeout_at(deadline, self.store.update_status(order_id, status))
            .await
            .map_err(|_| AppError::Timeout(self.config.operation_timeout))??;

        tracing::info!(order_id = %order_id, status = %status, "Order status updated");

        match timeout_at(deadline, self.cache.invalidate(order_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(order_id, CacheOp::Invalidate, e),
            Err(_) => self.report(order_id, CacheOp::Invalidate, deadline_exceeded()),
        }

        Ok(updated)
    }

    // ========== Helpers ==========

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.operation_timeout
    }

    async fn populate(&self, order: &Order, deadline: Instant) {
        match timeout_at(deadline, self.cache.populate(order, self.config.cache_ttl)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(&order.order_id, CacheOp::Populate, e),
            Err(_) => self.report(&order.order_id, CacheOp::Populate, deadline_exceeded()),
        }
    }

    fn report(&self, order_id: &str, op: CacheOp, error: CacheError) {
        bump(&self.counters.cache_failures);
        tracing::warn!(order_id = %order_id, op = ?op, error = %error, "Cache operation failed");

        // No subscribers is fine
        let _ = self.cache_failures.send(CacheFailure {
            order_id: order_id.to_string(),
            op,
            error,
        });
    }
}

fn deadline_exceeded() -> CacheError {
    CacheError::Backend("deadline exceeded".to_string())
}
