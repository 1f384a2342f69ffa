//! In-process broker
//!
//! Behaves like a single durable queue with manual acknowledgment:
//! - a requeued message goes back to the head of the queue, flagged as
//!   redelivered, with its delivery count incremented
//! - a message nacked without requeue is dropped
//! - after [`MemoryBroker::close`], the source drains what is queued and ends
//!   once every handed-out delivery has been settled
//!
//! Every settlement is recorded so tests can assert on ack decisions.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{AckAction, Acker, Delivery, MessageSource};
use crate::utils::AppError;

/// A recorded settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub tag: u64,
    pub body: Vec<u8>,
    pub delivery_count: u32,
    pub action: AckAction,
}

#[derive(Debug)]
struct Queued {
    body: Vec<u8>,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<Queued>,
    unsettled: usize,
    closed: bool,
    next_tag: u64,
    settlements: Vec<Settlement>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

/// Producer / inspection handle of an in-process queue
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumer side of the queue
    pub fn source(&self) -> MemorySource {
        MemorySource {
            shared: self.shared.clone(),
        }
    }

    pub fn publish(&self, body: impl Into<Vec<u8>>) {
        self.shared.state.lock().queue.push_back(Queued {
            body: body.into(),
            delivery_count: 0,
        });
        self.shared.notify.notify_one();
    }

    /// No more publishes; the source ends once the queue is drained and settled
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.notify.notify_one();
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.shared.state.lock().settlements.clone()
    }

    /// Messages waiting in the queue
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Deliveries handed out but not yet settled
    pub fn unsettled(&self) -> usize {
        self.shared.state.lock().unsettled
    }
}

/// Consumer side of a [`MemoryBroker`]
#[derive(Debug)]
pub struct MemorySource {
    shared: Arc<Shared>,
}

impl MemorySource {
    fn try_next(&self) -> Option<Option<Delivery>> {
        let mut state = self.shared.state.lock();

        if let Some(mut queued) = state.queue.pop_front() {
            queued.delivery_count += 1;
            state.next_tag += 1;
            state.unsettled += 1;

            let tag = state.next_tag;
            let acker = MemoryAcker {
                shared: self.shared.clone(),
                tag,
                body: queued.body.clone(),
                delivery_count: queued.delivery_count,
            };
            return Some(Some(Delivery::new(
                tag,
                queued.body,
                queued.delivery_count > 1,
                Some(queued.delivery_count),
                Box::new(acker),
            )));
        }

        if state.closed && state.unsettled == 0 {
            return Some(None);
        }
        None
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn next(&mut self) -> Option<Result<Delivery, AppError>> {
        loop {
            // Nothing is taken from the queue across an await, so dropping this
            // future at the await point loses no message
            if let Some(next) = self.try_next() {
                return next.map(Ok);
            }
            self.shared.notify.notified().await;
        }
    }

    async fn close(&mut self) -> Result<(), AppError> {
        self.shared.state.lock().closed = true;
        Ok(())
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
    tag: u64,
    body: Vec<u8>,
    delivery_count: u32,
}

impl MemoryAcker {
    fn settle(self, action: AckAction) {
        let mut state = self.shared.state.lock();
        state.unsettled = state.unsettled.saturating_sub(1);

        if action == (AckAction::Nack { requeue: true }) {
            state.queue.push_front(Queued {
                body: self.body.clone(),
                delivery_count: self.delivery_count,
            });
        }
        state.settlements.push(Settlement {
            tag: self.tag,
            body: self.body,
            delivery_count: self.delivery_count,
            action,
        });
        drop(state);

        self.shared.notify.notify_one();
    }
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), AppError> {
        self.settle(AckAction::Ack);
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), AppError> {
        self.settle(AckAction::Nack { requeue });
        Ok(())
    }
}
