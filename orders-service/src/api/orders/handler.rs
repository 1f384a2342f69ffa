//! Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use shared::{Order, OrderStatusUpdate};

use crate::core::AppState;
use crate::utils::AppResult;

/// Get order by external id
pub async fn get_by_order_id(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state.processor.read(&order_id).await?;
    Ok(Json(order))
}

/// Update order status
pub async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(payload): Json<OrderStatusUpdate>,
) -> AppResult<Json<Order>> {
    let order = state
        .processor
        .update_status(&order_id, &payload.status)
        .await?;
    Ok(Json(order))
}
