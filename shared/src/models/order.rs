//! Order Model
//!
//! `Order` / `OrderItem` are the stored snapshot (what the store returns and the
//! cache holds). `OrderCreate` / `OrderItemCreate` are the inbound event payload
//! delivered by the message queue.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places kept for every monetary amount
pub const MONEY_SCALE: u32 = 2;

/// Round to two decimal places (midpoint away from zero) and fix the scale at two,
/// so `10` and `10.00` serialize identically.
pub fn normalize_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Order item row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: i64,
    /// System id of the owning order (`orders.id`)
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    /// Unit price
    pub price: Decimal,
    pub name: String,
}

/// Order snapshot: header plus its items, ordered by item id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    /// External identifier supplied by the producer (globally unique)
    pub order_id: String,
    pub user_id: i64,
    pub status: String,
    /// Accepted as sent by the producer, never recomputed from the items
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // -- Relations (populated by application code, skipped by FromRow) --

    #[cfg_attr(feature = "db", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Sum of `quantity * price` over all items
    pub fn items_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum()
    }

    /// Whether this stored order was created from `create`.
    ///
    /// Ids and timestamps are assigned by the store, and `status` may have been
    /// updated since creation, so none of them take part in the comparison.
    pub fn matches_create(&self, create: &OrderCreate) -> bool {
        self.order_id == create.order_id
            && self.user_id == create.user_id
            && self.total_price == create.total_price
            && self.items.len() == create.items.len()
            && self.items.iter().zip(&create.items).all(|(stored, wanted)| {
                stored.product_id == wanted.product_id
                    && stored.quantity == wanted.quantity
                    && stored.price == wanted.price
                    && stored.name == wanted.name
            })
    }
}

/// Order item payload (inbound, without ids)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemCreate {
    pub product_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub name: String,
}

/// Order event payload as delivered by the queue.
///
/// Unknown fields (e.g. an `id` or timestamps set by a producer) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreate {
    pub order_id: String,
    pub user_id: i64,
    pub status: String,
    pub total_price: Decimal,
    pub items: Vec<OrderItemCreate>,
}

impl OrderCreate {
    /// Parse a raw message body
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let mut create: OrderCreate = serde_json::from_slice(body)?;
        create.normalize();
        Ok(create)
    }

    /// Normalize monetary amounts to two decimal places
    pub fn normalize(&mut self) {
        self.total_price = normalize_money(self.total_price);
        for item in &mut self.items {
            item.price = normalize_money(item.price);
        }
    }

    /// Sum of `quantity * price` over all items
    pub fn items_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum()
    }
}

/// Status update payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn widget_payload() -> &'static str {
        r#"{
            "order_id": "ORD-1",
            "user_id": 42,
            "status": "pending",
            "total_price": 19.98,
            "items": [{"product_id": 7, "quantity": 2, "price": 9.99, "name": "Widget"}]
        }"#
    }

    #[test]
    fn test_from_slice_reads_numeric_decimals() {
        let create = OrderCreate::from_slice(widget_payload().as_bytes()).unwrap();
        assert_eq!(create.order_id, "ORD-1");
        assert_eq!(create.total_price, Decimal::from_str("19.98").unwrap());
        assert_eq!(create.items[0].price.to_string(), "9.99");
        assert_eq!(create.items_total(), create.total_price);
    }

    #[test]
    fn test_from_slice_ignores_unknown_fields() {
        let body = r#"{"id": 99, "order_id": "A", "user_id": 1, "status": "new",
                       "total_price": "5", "items": [], "created_at": "whenever"}"#;
        let create = OrderCreate::from_slice(body.as_bytes()).unwrap();
        assert_eq!(create.total_price.to_string(), "5.00");
    }

    #[test]
    fn test_from_slice_rejects_malformed_payloads() {
        assert!(OrderCreate::from_slice(b"not json").is_err());
        assert!(OrderCreate::from_slice(br#"{"order_id": "A"}"#).is_err());
        assert!(OrderCreate::from_slice(br#"{"order_id": 1, "user_id": 1, "status": "x", "total_price": 1, "items": []}"#).is_err());
    }

    #[test]
    fn test_normalize_money_rounds_half_away_from_zero() {
        assert_eq!(normalize_money(Decimal::from_str("1.005").unwrap()).to_string(), "1.01");
        assert_eq!(normalize_money(Decimal::from_str("1.004").unwrap()).to_string(), "1.00");
        assert_eq!(normalize_money(Decimal::from(3)).to_string(), "3.00");
    }

    #[test]
    fn test_snapshot_json_roundtrip_is_exact() {
        let order = Order {
            id: 1,
            order_id: "ORD-1".into(),
            user_id: 42,
            status: "pending".into(),
            total_price: Decimal::from_str("19.98").unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: vec![OrderItem {
                id: 1,
                order_id: 1,
                product_id: 7,
                quantity: 2,
                price: Decimal::from_str("9.99").unwrap(),
                name: "Widget".into(),
            }],
        };
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
        assert_eq!(back.total_price.to_string(), "19.98");
    }

    #[test]
    fn test_matches_create_ignores_ids_timestamps_and_status() {
        let create = OrderCreate::from_slice(widget_payload().as_bytes()).unwrap();
        let mut stored = Order {
            id: 10,
            order_id: create.order_id.clone(),
            user_id: create.user_id,
            status: create.status.clone(),
            total_price: create.total_price,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: vec![OrderItem {
                id: 33,
                order_id: 10,
                product_id: 7,
                quantity: 2,
                price: create.items[0].price,
                name: "Widget".into(),
            }],
        };
        assert!(stored.matches_create(&create));

        stored.status = "shipped".into();
        assert!(stored.matches_create(&create));

        stored.items[0].quantity = 3;
        assert!(!stored.matches_create(&create));
    }
}
