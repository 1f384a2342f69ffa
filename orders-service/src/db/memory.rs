//! In-memory order store
//!
//! Mirrors the PostgreSQL schema: an `orders` table keyed by system id with a
//! unique index on the external id, and an `order_items` table grouped by
//! owning order. A create builds every row first and only then applies them
//! under one lock, so a failure at any step leaves no partial rows.
//!
//! Faults can be injected to exercise the pipeline's failure handling.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shared::{Order, OrderCreate, OrderItem};

use super::{OrderStore, StoreError};

/// Injectable failure
#[derive(Debug, Clone)]
pub enum StoreFault {
    /// Every operation fails with a transient error
    Unavailable,
    /// `create` fails after staging this many item rows
    FailAfterItems(usize),
    /// `create` is refused by the database (e.g. a check constraint)
    Rejected,
    /// Every operation sleeps before touching the tables
    Delay(Duration),
}

#[derive(Debug, Default)]
struct Tables {
    /// orders.id -> header (items empty)
    orders: BTreeMap<i64, Order>,
    /// orders.order_id unique index
    by_order_id: HashMap<String, i64>,
    /// order_items grouped by orders.id, ordered by item id
    items: HashMap<i64, Vec<OrderItem>>,
    next_order_id: i64,
    next_item_id: i64,
}

#[derive(Debug)]
struct ActiveFault {
    fault: StoreFault,
    /// `None` = until cleared
    remaining: Option<usize>,
}

/// In-process [`OrderStore`]
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    tables: Mutex<Tables>,
    fault: Mutex<Option<ActiveFault>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every operation with `fault` until [`clear_faults`](Self::clear_faults)
    pub fn fail_with(&self, fault: StoreFault) {
        *self.fault.lock() = Some(ActiveFault {
            fault,
            remaining: None,
        });
    }

    /// Fail the next `times` operations with `fault`, then recover
    pub fn fail_next(&self, fault: StoreFault, times: usize) {
        *self.fault.lock() = Some(ActiveFault {
            fault,
            remaining: Some(times),
        });
    }

    pub fn clear_faults(&self) {
        *self.fault.lock() = None;
    }

    /// Number of rows in `orders`
    pub fn order_count(&self) -> usize {
        self.tables.lock().orders.len()
    }

    /// Number of rows in `order_items`
    pub fn item_count(&self) -> usize {
        self.tables.lock().items.values().map(Vec::len).sum()
    }

    fn take_fault(&self) -> Option<StoreFault> {
        let mut slot = self.fault.lock();
        let active = slot.as_mut()?;
        let fault = active.fault.clone();
        match active.remaining {
            Some(0) => {
                *slot = None;
                return None;
            }
            Some(ref mut n) => {
                *n -= 1;
                if *n == 0 {
                    *slot = None;
                }
            }
            None => {}
        }
        Some(fault)
    }

    /// Apply the pending fault, if any; returns the fault for create-specific handling
    async fn enter(&self) -> Result<Option<StoreFault>, StoreError> {
        match self.take_fault() {
            Some(StoreFault::Unavailable) => Err(StoreError::Unavailable(
                "injected: connection refused".to_string(),
            )),
            Some(StoreFault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn snapshot(tables: &Tables, id: i64) -> Option<Order> {
        let mut order = tables.orders.get(&id)?.clone();
        order.items = tables.items.get(&id).cloned().unwrap_or_default();
        Some(order)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: &OrderCreate) -> Result<Order, StoreError> {
        let fault = self.enter().await?;

        let mut tables = self.tables.lock();

        if tables.by_order_id.contains_key(&order.order_id) {
            return Err(StoreError::Conflict(order.order_id.clone()));
        }
        if let Some(StoreFault::Rejected) = fault {
            return Err(StoreError::Rejected(
                "injected: check constraint violated".to_string(),
            ));
        }

        // Stage: ids are taken from local counters and written back on commit
        let now = Utc::now();
        let order_row_id = tables.next_order_id + 1;
        let mut next_item_id = tables.next_item_id;
        let mut staged_items = Vec::with_capacity(order.items.len());

        for (idx, item) in order.items.iter().enumerate() {
            if let Some(StoreFault::FailAfterItems(limit)) = fault
                && idx >= limit
            {
                return Err(StoreError::Unavailable(format!(
                    "injected: connection lost after {limit} item rows"
                )));
            }
            next_item_id += 1;
            staged_items.push(OrderItem {
                id: next_item_id,
                order_id: order_row_id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
                name: item.name.clone(),
            });
        }

        let header = Order {
            id: order_row_id,
            order_id: order.order_id.clone(),
            user_id: order.user_id,
            status: order.status.clone(),
            total_price: order.total_price,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        };

        let mut stored = header.clone();
        stored.items = staged_items.clone();

        // Commit
        tables.next_order_id = order_row_id;
        tables.next_item_id = next_item_id;
        tables.by_order_id.insert(order.order_id.clone(), order_row_id);
        tables.orders.insert(order_row_id, header);
        tables.items.insert(order_row_id, staged_items);

        Ok(stored)
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        self.enter().await?;

        let tables = self.tables.lock();
        Ok(tables
            .by_order_id
            .get(order_id)
            .and_then(|id| Self::snapshot(&tables, *id)))
    }

    async fn update_status(&self, order_id: &str, status: &str) -> Result<Order, StoreError> {
        self.enter().await?;

        let mut tables = self.tables.lock();
        let id = *tables
            .by_order_id
            .get(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;

        if let Some(header) = tables.orders.get_mut(&id) {
            header.status = status.to_string();
            header.updated_at = Utc::now();
        }

        Self::snapshot(&tables, id).ok_or_else(|| StoreError::NotFound(order_id.to_string()))
    }
}
