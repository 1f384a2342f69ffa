use std::str::FromStr;
use std::time::Duration;

use crate::message::{AmqpConfig, ConsumerConfig, ProcessorConfig};
use crate::utils::AppError;

/// Service configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | DATABASE_URL | built from POSTGRES_* | full PostgreSQL URL |
/// | POSTGRES_HOST / _PORT / _USER / _PASSWORD / _DB / _SSLMODE | localhost / 5432 / postgres / postgres / orders_db / disable | connection parts |
/// | POSTGRES_MAX_CONNECTIONS | 10 | pool size |
/// | REDIS_HOST / _PORT / _PASSWORD / _DB | localhost / 6379 / - / 0 | cache server |
/// | CACHE_TTL_SECS | 86400 | snapshot lifetime |
/// | RABBITMQ_HOST / _PORT / _USER / _PASSWORD / _VHOST / _QUEUE | localhost / 5672 / guest / guest / / / orders | broker |
/// | RABBITMQ_DEAD_LETTER_EXCHANGE | - | `x-dead-letter-exchange` of the queue |
/// | RABBITMQ_QUORUM_QUEUE | false | declare a quorum queue (needed for delivery counts) |
/// | RABBITMQ_CONSUMER_TAG | orders-service-{uuid} | consumer tag |
/// | CONSUMER_MAX_IN_FLIGHT | 1 | in-flight bound and prefetch |
/// | PROCESSING_TIMEOUT_MS | 30000 | deadline per attempt / read |
/// | MAX_REDELIVERIES | 5 | poison-message guard |
/// | REQUEUE_DELAY_MS | 1000 | wait before a requeue nack |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | drain bound at shutdown |
/// | SERVER_PORT | 8080 | HTTP read API port |
/// | LOG_LEVEL / LOG_JSON / LOG_DIR | info / true outside development / - | logging |
/// | ENVIRONMENT | development | development / staging / production |
///
/// # Example
///
/// ```ignore
/// POSTGRES_HOST=db RABBITMQ_HOST=mq SERVER_PORT=9000 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// development | staging | production
    pub environment: String,
    pub server_port: u16,
    pub log: LogConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub amqp: AmqpConfig,
    pub consumer: ConsumerConfig,
    pub processing_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    /// File logging is disabled when unset
    pub dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
    pub cache_ttl: Duration,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Variable lookup with typed parsing and defaults
struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Set and non-empty
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn millis(&self, key: &str, default: u64) -> Duration {
        Duration::from_millis(self.parse(key, default))
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// Unset or unparsable variables fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env { lookup };

        let environment = env.string("ENVIRONMENT", "development");
        let is_development = environment == "development";

        let database_url = env.get("DATABASE_URL").unwrap_or_else(|| {
            format!(
                "postgres://{}:{}@{}:{}/{}?sslmode={}",
                env.string("POSTGRES_USER", "postgres"),
                env.string("POSTGRES_PASSWORD", "postgres"),
                env.string("POSTGRES_HOST", "localhost"),
                env.parse("POSTGRES_PORT", 5432u16),
                env.string("POSTGRES_DB", "orders_db"),
                env.string("POSTGRES_SSLMODE", "disable"),
            )
        });

        let max_in_flight: usize = env.parse("CONSUMER_MAX_IN_FLIGHT", 1);

        Self {
            server_port: env.parse("SERVER_PORT", 8080),
            log: LogConfig {
                level: env.string("LOG_LEVEL", "info"),
                json: env.parse("LOG_JSON", !is_development),
                dir: env.get("LOG_DIR"),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: env.parse("POSTGRES_MAX_CONNECTIONS", 10),
            },
            redis: RedisConfig {
                host: env.string("REDIS_HOST", "localhost"),
                port: env.parse("REDIS_PORT", 6379),
                password: env.get("REDIS_PASSWORD"),
                db: env.parse("REDIS_DB", 0),
                cache_ttl: Duration::from_secs(env.parse("CACHE_TTL_SECS", 86_400)),
            },
            amqp: AmqpConfig {
                host: env.string("RABBITMQ_HOST", "localhost"),
                port: env.parse("RABBITMQ_PORT", 5672),
                user: env.string("RABBITMQ_USER", "guest"),
                password: env.string("RABBITMQ_PASSWORD", "guest"),
                vhost: env.string("RABBITMQ_VHOST", "/"),
                queue: env.string("RABBITMQ_QUEUE", "orders"),
                dead_letter_exchange: env.get("RABBITMQ_DEAD_LETTER_EXCHANGE"),
                quorum: env.parse("RABBITMQ_QUORUM_QUEUE", false),
                prefetch: u16::try_from(max_in_flight).unwrap_or(u16::MAX),
                consumer_tag: env
                    .get("RABBITMQ_CONSUMER_TAG")
                    .unwrap_or_else(|| format!("orders-service-{}", uuid::Uuid::new_v4())),
            },
            consumer: ConsumerConfig {
                max_in_flight,
                max_redeliveries: env.parse("MAX_REDELIVERIES", 5),
                requeue_delay: env.millis("REQUEUE_DELAY_MS", 1000),
                shutdown_timeout: env.millis("SHUTDOWN_TIMEOUT_MS", 10_000),
            },
            processing_timeout: env.millis("PROCESSING_TIMEOUT_MS", 30_000),
            environment,
        }
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.consumer.max_in_flight == 0 || self.consumer.max_in_flight > u16::MAX as usize {
            return Err(AppError::config(format!(
                "CONSUMER_MAX_IN_FLIGHT must be between 1 and {} (got {})",
                u16::MAX,
                self.consumer.max_in_flight
            )));
        }
        if self.processing_timeout.is_zero() {
            return Err(AppError::config("PROCESSING_TIMEOUT_MS must be positive"));
        }
        if self.consumer.shutdown_timeout.is_zero() {
            return Err(AppError::config("SHUTDOWN_TIMEOUT_MS must be positive"));
        }
        if self.redis.cache_ttl.is_zero() {
            return Err(AppError::config("CACHE_TTL_SECS must be positive"));
        }
        if self.database.max_connections == 0 {
            return Err(AppError::config("POSTGRES_MAX_CONNECTIONS must be positive"));
        }
        if self.amqp.queue.trim().is_empty() {
            return Err(AppError::config("RABBITMQ_QUEUE must not be empty"));
        }
        Ok(())
    }

    pub fn processor(&self) -> ProcessorConfig {
        ProcessorConfig {
            cache_ttl: self.redis.cache_ttl,
            operation_timeout: self.processing_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
