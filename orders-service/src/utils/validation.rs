//! Input validation helpers
//!
//! Limits mirror the column definitions in `migrations/`:
//! - `orders.order_id`, `order_items.name`: VARCHAR(255)
//! - `orders.status`: VARCHAR(50)
//! - monetary columns: NUMERIC(10, 2)
//!
//! A payload that fails here can never be persisted, so the pipeline treats it
//! exactly like an undecodable one (permanent reject).

use rust_decimal::Decimal;
use shared::OrderCreate;

use crate::utils::AppError;

// ── Limits ──────────────────────────────────────────────────────────

/// External order identifier
pub const MAX_ORDER_ID_LEN: usize = 255;

/// Order status
pub const MAX_STATUS_LEN: usize = 50;

/// Item display name
pub const MAX_ITEM_NAME_LEN: usize = 255;

/// Items per order
pub const MAX_ITEMS_PER_ORDER: usize = 1000;

/// Exclusive upper bound of NUMERIC(10, 2)
pub const MAX_AMOUNT_EXCLUSIVE: i64 = 100_000_000;

// ── Helpers ─────────────────────────────────────────────────────────

/// Validate that a required string is non-empty and within the length limit.
///
/// Length is counted in characters, like PostgreSQL VARCHAR.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    let len = value.chars().count();
    if len > max_len {
        return Err(AppError::validation(format!(
            "{field} is too long ({len} chars, max {max_len})"
        )));
    }
    Ok(())
}

/// Validate that an amount is non-negative and fits NUMERIC(10, 2).
pub fn validate_amount(value: Decimal, field: &str) -> Result<(), AppError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::validation(format!("{field} must not be negative")));
    }
    if value >= Decimal::from(MAX_AMOUNT_EXCLUSIVE) {
        return Err(AppError::validation(format!(
            "{field} exceeds {MAX_AMOUNT_EXCLUSIVE}"
        )));
    }
    Ok(())
}

/// Validate a status value (used by ingestion and by status updates)
pub fn validate_status(status: &str) -> Result<(), AppError> {
    validate_required_text(status, "status", MAX_STATUS_LEN)
}

/// Validate a decoded order event before it reaches the store.
pub fn validate_order_create(order: &OrderCreate) -> Result<(), AppError> {
    validate_required_text(&order.order_id, "order_id", MAX_ORDER_ID_LEN)?;
    validate_status(&order.status)?;
    validate_amount(order.total_price, "total_price")?;

    if order.items.is_empty() {
        return Err(AppError::validation("items must not be empty"));
    }
    if order.items.len() > MAX_ITEMS_PER_ORDER {
        return Err(AppError::validation(format!(
            "too many items ({}, max {MAX_ITEMS_PER_ORDER})",
            order.items.len()
        )));
    }

    for (idx, item) in order.items.iter().enumerate() {
        if item.quantity <= 0 {
            return Err(AppError::validation(format!(
                "items[{idx}].quantity must be positive (got {})",
                item.quantity
            )));
        }
        validate_amount(item.price, &format!("items[{idx}].price"))?;
        validate_required_text(&item.name, &format!("items[{idx}].name"), MAX_ITEM_NAME_LEN)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::OrderItemCreate;
    use std::str::FromStr;

    fn order() -> OrderCreate {
        OrderCreate {
            order_id: "ORD-1".into(),
            user_id: 42,
            status: "pending".into(),
            total_price: Decimal::from_str("19.98").unwrap(),
            items: vec![OrderItemCreate {
                product_id: 7,
                quantity: 2,
                price: Decimal::from_str("9.99").unwrap(),
                name: "Widget".into(),
            }],
        }
    }

    #[test]
    fn test_valid_order_passes() {
        assert!(validate_order_create(&order()).is_ok());
    }

    #[test]
    fn test_blank_order_id_rejected() {
        let mut o = order();
        o.order_id = "   ".into();
        let err = validate_order_create(&o).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let mut o = order();
        o.items[0].quantity = 0;
        assert!(validate_order_create(&o).is_err());
        o.items[0].quantity = -3;
        assert!(validate_order_create(&o).is_err());
    }

    #[test]
    fn test_amount_bounds() {
        assert!(validate_amount(Decimal::ZERO, "x").is_ok());
        assert!(validate_amount(Decimal::from_str("99999999.99").unwrap(), "x").is_ok());
        assert!(validate_amount(Decimal::from(100_000_000), "x").is_err());
        assert!(validate_amount(Decimal::from_str("-0.01").unwrap(), "x").is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        let name: String = "é".repeat(MAX_ITEM_NAME_LEN);
        assert!(validate_required_text(&name, "name", MAX_ITEM_NAME_LEN).is_ok());
        let long = format!("{name}x");
        assert!(validate_required_text(&long, "name", MAX_ITEM_NAME_LEN).is_err());
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut o = order();
        o.items.clear();
        assert!(validate_order_create(&o).is_err());
    }
}
