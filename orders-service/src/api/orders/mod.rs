//! Order API Module
//!
//! Orders are created only by the message consumer; this API reads them and
//! changes their status.

mod handler;

use axum::{
    Router,
    routing::{get, put},
};

use crate::core::AppState;

/// Order router
pub fn router() -> Router<AppState> {
    Router::new().nest("/orders", routes())
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/{order_id}", get(handler::get_by_order_id))
        .route("/{order_id}/status", put(handler::update_status))
}
