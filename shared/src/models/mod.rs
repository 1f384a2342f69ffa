//! Data models
//!
//! Shared between the order pipeline and its callers (via API).
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All system IDs are `i64` (PostgreSQL BIGSERIAL).

pub mod order;

// Re-exports
pub use order::*;
