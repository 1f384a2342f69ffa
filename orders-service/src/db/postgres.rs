//! PostgreSQL order store
//!
//! Tables (see `migrations/`):
//! - `orders` - one row per order, `order_id` UNIQUE
//! - `order_items` - `order_id` references `orders.id` ON DELETE CASCADE

use async_trait::async_trait;
use shared::{Order, OrderCreate, OrderItem};
use sqlx::{PgPool, Postgres, Transaction};

use super::{OrderStore, StoreError};

/// sqlx-backed [`OrderStore`]
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn fetch_items(
    tx: &mut Transaction<'_, Postgres>,
    order_row_id: i64,
) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, order_id, product_id, quantity, price, name
        FROM order_items
        WHERE order_id = $1
        ORDER BY id
        "#,
    )
    .bind(order_row_id)
    .fetch_all(&mut **tx)
    .await
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: &OrderCreate) -> Result<Order, StoreError> {
        let classify = |e: sqlx::Error| StoreError::from_sqlx(e, &order.order_id);

        let mut tx = self.pool.begin().await.map_err(classify)?;

        // 1. Order header; id and timestamps come from the database
        let mut stored: Order = sqlx::query_as(
            r#"
            INSERT INTO orders (order_id, user_id, status, total_price)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, user_id, status, total_price, created_at, updated_at
            "#,
        )
        .bind(&order.order_id)
        .bind(order.user_id)
        .bind(&order.status)
        .bind(order.total_price)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        // 2. Items tagged with the assigned id, in payload order
        for item in &order.items {
            let row: OrderItem = sqlx::query_as(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, price, name)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, order_id, product_id, quantity, price, name
                "#,
            )
            .bind(stored.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price)
            .bind(&item.name)
            .fetch_one(&mut *tx)
            .await
            .map_err(classify)?;
            stored.items.push(row);
        }

        // Dropping `tx` on any early return above rolls everything back
        tx.commit().await.map_err(classify)?;

        Ok(stored)
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        let classify = |e: sqlx::Error| StoreError::from_sqlx(e, order_id);

        let mut tx = self.pool.begin().await.map_err(classify)?;

        let header: Option<Order> = sqlx::query_as(
            r#"
            SELECT id, order_id, user_id, status, total_price, created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;

        let Some(mut order) = header else {
            tx.commit().await.map_err(classify)?;
            return Ok(None);
        };

        order.items = fetch_items(&mut tx, order.id).await.map_err(classify)?;
        tx.commit().await.map_err(classify)?;

        Ok(Some(order))
    }

    async fn update_status(&self, order_id: &str, status: &str) -> Result<Order, StoreError> {
        let classify = |e: sqlx::Error| StoreError::from_sqlx(e, order_id);

        let mut tx = self.pool.begin().await.map_err(classify)?;

        let header: Option<Order> = sqlx::query_as(
            r#"
            UPDATE orders
            SET status = $1, updated_at = NOW()
            WHERE order_id = $2
            RETURNING id, order_id, user_id, status, total_price, created_at, updated_at
            "#,
        )
        .bind(status)
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;

        let Some(mut order) = header else {
            return Err(StoreError::NotFound(order_id.to_string()));
        };

        order.items = fetch_items(&mut tx, order.id).await.map_err(classify)?;
        tx.commit().await.map_err(classify)?;

        Ok(order)
    }
}
