//! Message ingestion
//!
//! ```text
//! ┌───────────────┐  Delivery   ┌───────────────┐  body   ┌────────────────┐
//! │ MessageSource │ ──────────▶ │ OrderConsumer │ ──────▶ │ OrderProcessor │
//! │ (AMQP/Memory) │ ◀────────── │  (handler)    │ ◀────── │  (processor)   │
//! └───────────────┘  ack/nack   └───────────────┘  result └────────────────┘
//! ```
//!
//! Deliveries are at-least-once. Only the consumer settles them: the processor
//! decides a [`ProcessResult`], the consumer maps it to an [`AckAction`].

use std::fmt;

use async_trait::async_trait;

pub mod amqp;
pub mod handler;
pub mod memory;
pub mod processor;

pub use amqp::{AmqpConfig, AmqpSource};
pub use handler::{ConsumerConfig, OrderConsumer};
pub use memory::{MemoryBroker, MemorySource, Settlement};
pub use processor::{
    CacheFailure, CacheOp, OrderProcessor, ProcessResult, ProcessorConfig, ProcessorStats,
};

use crate::utils::AppError;

/// How a delivery is settled with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckAction {
    Ack,
    Nack { requeue: bool },
}

/// Broker-side settlement of a single delivery
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(self: Box<Self>) -> Result<(), AppError>;

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), AppError>;
}

/// A message handed out by a [`MessageSource`], pending settlement
pub struct Delivery {
    /// Broker delivery tag (unique per channel)
    pub tag: u64,
    pub body: Vec<u8>,
    /// Broker flagged this as a redelivery
    pub redelivered: bool,
    /// Total number of deliveries of this message including this one,
    /// when the source can tell
    pub delivery_count: Option<u32>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(
        tag: u64,
        body: Vec<u8>,
        redelivered: bool,
        delivery_count: Option<u32>,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            tag,
            body,
            redelivered,
            delivery_count,
            acker,
        }
    }

    /// Settle with the broker, consuming the delivery
    pub(crate) async fn settle(self, action: AckAction) -> Result<(), AppError> {
        match action {
            AckAction::Ack => self.acker.ack().await,
            AckAction::Nack { requeue } => self.acker.nack(requeue).await,
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .field("delivery_count", &self.delivery_count)
            .finish()
    }
}

/// Durable queue delivering order events at-least-once
///
/// `next` must be cancel-safe: the consumer races it against shutdown.
#[async_trait]
pub trait MessageSource: Send {
    /// Next delivery; `None` once the source is exhausted or closed
    async fn next(&mut self) -> Option<Result<Delivery, AppError>>;

    /// Stop consuming and release the broker connection
    async fn close(&mut self) -> Result<(), AppError>;
}
