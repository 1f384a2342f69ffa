//! Server Implementation
//!
//! Bootstrap order: PostgreSQL pool + migrations, Redis, processor, RabbitMQ
//! consumer, HTTP API. Shutdown runs in reverse: the consumer drains, the HTTP
//! server stops accepting, then the pool is closed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::cache::{RedisCache, ResultCache};
use crate::core::{AppState, Config};
use crate::db::{self, OrderStore, PgOrderStore};
use crate::message::{AmqpSource, OrderConsumer, OrderProcessor};

/// Wait for a pooled connection before reporting the store unavailable
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Order ingestion service
pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until `shutdown_token` is cancelled or the consumer fails
    pub async fn run(&self, shutdown_token: CancellationToken) -> anyhow::Result<()> {
        let config = &self.config;

        // 1. Store
        let pool = db::connect(
            &config.database.url,
            config.database.max_connections,
            POOL_ACQUIRE_TIMEOUT,
        )
        .await
        .context("Failed to connect to PostgreSQL")?;
        db::migrate(&pool)
            .await
            .context("Failed to apply database migrations")?;
        tracing::info!(max_connections = config.database.max_connections, "PostgreSQL ready");
        let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pool.clone()));

        // 2. Cache
        let cache: Arc<dyn ResultCache> = Arc::new(
            RedisCache::connect(&config.redis.url())
                .await
                .context("Failed to connect to Redis")?,
        );
        tracing::info!(host = %config.redis.host, "Redis ready");

        let processor = Arc::new(OrderProcessor::new(store, cache, config.processor()));

        // 3. Broker
        let source = AmqpSource::connect(&config.amqp)
            .await
            .context("Failed to connect to RabbitMQ")?;

        // 4. HTTP API
        let addr = format!("0.0.0.0:{}", config.server_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        tracing::info!("HTTP API listening on {addr}");

        let app = api::build_app(AppState::new(processor.clone()));
        let http_token = shutdown_token.clone();
        let http = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { http_token.cancelled().await })
                .await
        });

        // 5. Consumer (blocks until shutdown or failure)
        let consumer = OrderConsumer::new(
            source,
            processor,
            config.consumer.clone(),
            shutdown_token.clone(),
        );
        let consumed = consumer.run().await;

        // A failed consumer takes the HTTP API down with it
        shutdown_token.cancel();
        match http.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
            Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        }

        pool.close().await;
        tracing::info!("PostgreSQL pool closed");

        consumed.context("Order consumer failed")
    }
}
