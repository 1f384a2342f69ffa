//! Shared types for the orders pipeline
//!
//! Order snapshot and order event payload types used by the service and by
//! anything that talks to it (producers, API clients).

pub mod models;

// Re-exports
pub use models::{Order, OrderCreate, OrderItem, OrderItemCreate, OrderStatusUpdate};
pub use serde::{Deserialize, Serialize};
