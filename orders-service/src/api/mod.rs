//! HTTP API
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /health | GET | liveness and processor counters |
//! | /orders/{order_id} | GET | order snapshot (cache-aside read) |
//! | /orders/{order_id}/status | PUT | change status, invalidate the cached snapshot |

pub mod health;
pub mod orders;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::core::AppState;

/// Build the application router with all middleware and state
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(orders::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
