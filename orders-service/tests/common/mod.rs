#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use orders_service::{
    ConsumerConfig, MemoryBroker, MemoryCache, MemoryOrderStore, OrderConsumer, OrderProcessor,
    ProcessorConfig,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// The reference event: one item row, 2 x 9.99 = 19.98
pub fn widget_order(order_id: &str) -> Value {
    json!({
        "order_id": order_id,
        "user_id": 42,
        "status": "pending",
        "total_price": 19.98,
        "items": [
            {"product_id": 7, "quantity": 2, "price": 9.99, "name": "Widget"}
        ]
    })
}

/// An order with `items` single-quantity rows priced 1.50
pub fn multi_item_order(order_id: &str, items: usize) -> Value {
    let rows: Vec<Value> = (0..items)
        .map(|i| json!({"product_id": i, "quantity": 1, "price": "1.50", "name": format!("item-{i}")}))
        .collect();
    json!({
        "order_id": order_id,
        "user_id": 7,
        "status": "pending",
        "total_price": format!("{:.2}", 1.5 * items as f64),
        "items": rows
    })
}

pub fn body(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

pub struct Harness {
    pub store: Arc<MemoryOrderStore>,
    pub cache: Arc<MemoryCache>,
    pub processor: Arc<OrderProcessor>,
    pub broker: MemoryBroker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(operation_timeout: Duration) -> Self {
        let store = Arc::new(MemoryOrderStore::new());
        let cache = Arc::new(MemoryCache::new());
        let processor = Arc::new(OrderProcessor::new(
            store.clone(),
            cache.clone(),
            ProcessorConfig {
                cache_ttl: Duration::from_secs(60),
                operation_timeout,
            },
        ));
        Self {
            store,
            cache,
            processor,
            broker: MemoryBroker::new(),
        }
    }

    pub fn consumer(
        &self,
        config: ConsumerConfig,
        token: CancellationToken,
    ) -> OrderConsumer<orders_service::message::MemorySource> {
        OrderConsumer::new(self.broker.source(), self.processor.clone(), config, token)
    }

    /// Publish `bodies`, close the queue and consume until it is drained
    pub async fn consume_all(&self, bodies: &[Vec<u8>], config: ConsumerConfig) {
        for body in bodies {
            self.broker.publish(body.clone());
        }
        self.broker.close();
        self.consumer(config, CancellationToken::new())
            .run()
            .await
            .unwrap();
    }
}

/// No requeue delay, so redeliveries happen immediately
pub fn fast_consumer() -> ConsumerConfig {
    ConsumerConfig {
        max_in_flight: 1,
        max_redeliveries: 5,
        requeue_delay: Duration::ZERO,
        shutdown_timeout: Duration::from_secs(5),
    }
}
