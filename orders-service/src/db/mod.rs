//! Database access layer
//!
//! [`OrderStore`] is the transactional persistence contract used by the
//! processor. Two implementations:
//!
//! - [`postgres::PgOrderStore`] - PostgreSQL via sqlx (production)
//! - [`memory::MemoryOrderStore`] - in-process tables with staged commits and
//!   fault injection (tests, local runs)

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use shared::{Order, OrderCreate};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use memory::{MemoryOrderStore, StoreFault};
pub use postgres::PgOrderStore;

/// Store-level error, classified for the acknowledgment decision
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// External order id already used (unique violation)
    #[error("order {0} already exists")]
    Conflict(String),

    /// No order with this external id
    #[error("order {0} not found")]
    NotFound(String),

    /// The database refused the data itself (integrity / data exception).
    /// Retrying the same write can never succeed.
    #[error("rejected by database: {0}")]
    Rejected(String),

    /// Connectivity, pool exhaustion, I/O, serialization failures
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Classify a sqlx error raised while working on `order_id`.
    ///
    /// SQLSTATE classes 22 (data exception) and 23 (integrity constraint) are
    /// permanent; everything else is treated as transient.
    pub fn from_sqlx(err: sqlx::Error, order_id: &str) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound(order_id.to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return StoreError::Conflict(order_id.to_string());
                }
                match db_err.code().as_deref() {
                    Some(code) if code.starts_with("22") || code.starts_with("23") => {
                        StoreError::Rejected(format!("{} (SQLSTATE {code})", db_err.message()))
                    }
                    _ => StoreError::Unavailable(err.to_string()),
                }
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Transactional order persistence
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order header and all of its items atomically.
    ///
    /// Returns the stored snapshot with system ids and timestamps.
    async fn create(&self, order: &OrderCreate) -> Result<Order, StoreError>;

    /// Header plus items (ordered by item id); `None` when the id is unknown
    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Order>, StoreError>;

    /// Set `status` and bump `updated_at`; items are untouched
    async fn update_status(&self, order_id: &str, status: &str) -> Result<Order, StoreError>;
}

/// Open a PostgreSQL pool
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}

/// Apply embedded migrations (`migrations/`)
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
