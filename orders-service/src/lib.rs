//! Orders Service - message-driven order ingestion
//!
//! Order events arrive on a durable queue, are persisted transactionally and
//! cached for reads.
//!
//! ```text
//! RabbitMQ ──▶ OrderConsumer ──▶ OrderProcessor ──▶ OrderStore (PostgreSQL)
//!    ▲              │                  │
//!    └── ack/nack ──┘                  └──▶ ResultCache (Redis)
//!
//! HTTP ──▶ api ──▶ OrderProcessor::read ──▶ cache ──(miss)──▶ store
//! ```
//!
//! # Module layout
//!
//! ```text
//! orders-service/src/
//! ├── core/      # config, state, bootstrap
//! ├── db/        # order store (PostgreSQL, in-memory)
//! ├── cache/     # result cache (Redis, in-memory)
//! ├── message/   # sources, processor, consumer
//! ├── api/       # HTTP routes
//! └── utils/     # errors, logging, validation
//! ```

pub mod api;
pub mod cache;
pub mod core;
pub mod db;
pub mod message;
pub mod utils;

pub use cache::{CacheError, MemoryCache, RedisCache, ResultCache};
pub use core::{AppState, Config, Server};
pub use db::{MemoryOrderStore, OrderStore, PgOrderStore, StoreError, StoreFault};
pub use message::{
    AckAction, CacheFailure, CacheOp, ConsumerConfig, MemoryBroker, OrderConsumer,
    OrderProcessor, ProcessResult, ProcessorConfig, ProcessorStats,
};
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};
pub use utils::{AppError, AppResult};
