use std::sync::Arc;
use std::time::Instant;

use crate::message::OrderProcessor;

/// Shared state of the HTTP API
///
/// Cloning is cheap; the processor is shared with the consumer worker.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<OrderProcessor>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(processor: Arc<OrderProcessor>) -> Self {
        Self {
            processor,
            started_at: Instant::now(),
        }
    }
}
