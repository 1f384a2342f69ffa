//! Order Consumer
//!
//! Reads deliveries from a [`MessageSource`], hands each body to the
//! [`OrderProcessor`] and settles the delivery with the broker.
//!
//! Features:
//! - bounded in-flight work (one permit per unsettled delivery)
//! - poison-message guard based on the delivery count
//! - delay before requeueing, interrupted by shutdown
//! - permanent rejects recorded in the dead-letter log
//! - graceful shutdown: stop reading, drain in-flight work, close the source

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::processor::{OrderProcessor, ProcessResult};
use super::{Delivery, MessageSource};
use crate::dead_letter_log;
use crate::utils::AppError;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Deliveries processed concurrently; 1 keeps delivery order
    pub max_in_flight: usize,
    /// A transient failure on a delivery seen more often than this is rejected
    pub max_redeliveries: u32,
    /// Wait before a requeue nack
    pub requeue_delay: Duration,
    /// Bound on draining in-flight work at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 1,
            max_redeliveries: 5,
            requeue_delay: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Consumer worker. One per process.
pub struct OrderConsumer<S> {
    source: S,
    processor: Arc<OrderProcessor>,
    config: ConsumerConfig,
    shutdown_token: CancellationToken,
}

impl<S: MessageSource> OrderConsumer<S> {
    pub fn new(
        source: S,
        processor: Arc<OrderProcessor>,
        config: ConsumerConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            source,
            processor,
            config,
            shutdown_token,
        }
    }

    /// Consume until shutdown or until the source ends.
    ///
    /// Returns an error when the source fails; in-flight work is drained and the
    /// source closed in every case.
    pub async fn run(mut self) -> Result<(), AppError> {
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let tracker = TaskTracker::new();
        let mut outcome = Ok(());

        tracing::info!(
            max_in_flight = self.config.max_in_flight,
            max_redeliveries = self.config.max_redeliveries,
            "Order consumer started"
        );

        loop {
            // Shutdown wins over work that is ready at the same time
            let permit = tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => break,
                next = self.source.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    let worker = Worker {
                        processor: self.processor.clone(),
                        config: self.config.clone(),
                        shutdown_token: self.shutdown_token.clone(),
                    };
                    tracker.spawn(async move {
                        worker.handle(delivery).await;
                        drop(permit);
                    });
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Message source failed");
                    outcome = Err(e);
                    break;
                }
                None => {
                    tracing::info!("Message source exhausted");
                    break;
                }
            }
        }

        tracker.close();
        if tokio::time::timeout(self.config.shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = tracker.len(),
                "Shutdown timeout reached with deliveries still in flight"
            );
        }

        if let Err(e) = self.source.close().await {
            tracing::warn!(error = %e, "Failed to close message source");
        }

        tracing::info!("Order consumer stopped");
        outcome
    }
}

/// Per-delivery handling, run on its own task
struct Worker {
    processor: Arc<OrderProcessor>,
    config: ConsumerConfig,
    shutdown_token: CancellationToken,
}

impl Worker {
    async fn handle(self, delivery: Delivery) {
        let tag = delivery.tag;
        let result = self.processor.handle(&delivery.body).await;
        let result =
            apply_poison_guard(result, delivery.delivery_count, self.config.max_redeliveries);

        match &result {
            ProcessResult::Success { order_id } => {
                tracing::info!(
                    delivery_tag = tag,
                    order_id = %order_id,
                    outcome = result.outcome(),
                    "Order processed"
                );
            }
            ProcessResult::Skipped { order_id } => {
                tracing::info!(
                    delivery_tag = tag,
                    order_id = %order_id,
                    outcome = result.outcome(),
                    "Order already stored"
                );
            }
            ProcessResult::Retry { reason } => {
                tracing::warn!(
                    delivery_tag = tag,
                    delivery_count = ?delivery.delivery_count,
                    reason = %reason,
                    outcome = result.outcome(),
                    "Processing failed, requeueing"
                );
            }
            ProcessResult::Failed { reason } => {
                tracing::error!(
                    delivery_tag = tag,
                    reason = %reason,
                    outcome = result.outcome(),
                    "Message rejected"
                );
                dead_letter_log!(tag, reason, delivery.body.len());
            }
        }

        if result.should_retry() && !self.config.requeue_delay.is_zero() {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {}
                _ = tokio::time::sleep(self.config.requeue_delay) => {}
            }
        }

        self.processor.record(&result);

        if let Err(e) = delivery.settle(result.ack_action()).await {
            // The broker redelivers unsettled messages once the channel closes
            tracing::error!(delivery_tag = tag, error = %e, "Failed to settle delivery");
        }
    }
}

/// Convert a retry into a permanent reject once a message has been delivered
/// more than `max_redeliveries` times.
fn apply_poison_guard(
    result: ProcessResult,
    delivery_count: Option<u32>,
    max_redeliveries: u32,
) -> ProcessResult {
    match (result, delivery_count) {
        (ProcessResult::Retry { reason }, Some(count)) if count > max_redeliveries => {
            ProcessResult::Failed {
                reason: format!("giving up after {count} deliveries: {reason}"),
            }
        }
        (result, _) => result,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tracing_subscriber::prelude::*;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::MemoryOrderStore;
    use crate::message::{AckAction, MemoryBroker, ProcessorConfig};
    use crate::utils::logger::{DEAD_LETTER_TARGET, file_layers};

    fn read_logs(dir: &Path) -> String {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect()
    }

    fn retry() -> ProcessResult {
        ProcessResult::Retry {
            reason: "store unavailable".into(),
        }
    }

    #[test]
    fn test_poison_guard_converts_exhausted_retry() {
        let guarded = apply_poison_guard(retry(), Some(6), 5);
        assert!(matches!(
            guarded,
            ProcessResult::Failed { ref reason } if reason.contains("6 deliveries")
        ));
    }

    #[test]
    fn test_poison_guard_keeps_retry_within_limit() {
        assert_eq!(apply_poison_guard(retry(), Some(5), 5), retry());
        assert_eq!(apply_poison_guard(retry(), None, 5), retry());
    }

    #[test]
    fn test_poison_guard_ignores_other_results() {
        let ok = ProcessResult::Success {
            order_id: "A".into(),
        };
        assert_eq!(apply_poison_guard(ok.clone(), Some(100), 5), ok);
    }

    #[tokio::test]
    async fn test_rejected_delivery_is_dead_lettered() {
        let dir = tempfile::tempdir().unwrap();
        let layers = file_layers(dir.path(), false).unwrap();
        let subscriber = tracing_subscriber::registry().with(layers);
        let _guard = tracing::subscriber::set_default(subscriber);

        let processor = Arc::new(OrderProcessor::new(
            Arc::new(MemoryOrderStore::new()),
            Arc::new(MemoryCache::new()),
            ProcessorConfig::default(),
        ));
        let broker = MemoryBroker::new();
        broker.publish("not json");
        broker.close();

        OrderConsumer::new(
            broker.source(),
            processor,
            ConsumerConfig::default(),
            CancellationToken::new(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(
            broker.settlements()[0].action,
            AckAction::Nack { requeue: false }
        );
        let dead_letter = read_logs(&dir.path().join(DEAD_LETTER_TARGET));
        assert!(dead_letter.contains("DEAD_LETTER"));
        assert!(dead_letter.contains("Malformed payload"));
        let app = read_logs(&dir.path().join("app"));
        assert!(app.contains("Message rejected"));
        assert!(!app.contains("DEAD_LETTER"));
    }
}
