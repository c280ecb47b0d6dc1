//! The bounded outbound buffer between classification and the message
//! bus.
//!
//! `push` drops the oldest pending record once the buffer is full
//! before inserting the new one, so under sustained overload the
//! freshest operator-facing alerts survive rather than the stalest.
//! `drain` attempts delivery in FIFO order and leaves anything that
//! was not confirmed at the head of the queue for the next attempt.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::AlerterResult;
use crate::messaging::MessageBus;

/// A single outbound record: which exchange/routing key it targets and
/// its JSON body.
#[derive(Debug, Clone)]
pub struct OutboundRecord {
    pub exchange: String,
    pub routing_key: String,
    pub body: Value,
}

/// A bounded, drop-oldest FIFO of pending outbound records.
pub struct PublishingBuffer {
    capacity: usize,
    records: VecDeque<OutboundRecord>,
}

impl PublishingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Push a record, dropping the oldest pending one first if the
    /// buffer is already at capacity.
    pub fn push(&mut self, record: OutboundRecord) {
        if self.is_full() {
            if let Some(dropped) = self.records.pop_front() {
                warn!(
                    exchange = %dropped.exchange,
                    routing_key = %dropped.routing_key,
                    "publishing buffer full, dropping oldest alert"
                );
            }
        }
        self.records.push_back(record);
    }

    /// Attempt to publish every pending record in FIFO order. Confirmed
    /// deliveries are removed; anything the broker reports as
    /// unroutable stays at the head for the next drain.
    pub async fn drain(&mut self, bus: &dyn MessageBus) -> AlerterResult<()> {
        while let Some(record) = self.records.front().cloned() {
            let delivered = bus
                .publish_confirmed(&record.exchange, &record.routing_key, record.body.clone(), true)
                .await?;

            if delivered {
                self.records.pop_front();
                debug!(
                    exchange = %record.exchange,
                    routing_key = %record.routing_key,
                    "drained alert to message bus"
                );
            } else {
                warn!(
                    exchange = %record.exchange,
                    routing_key = %record.routing_key,
                    "publish not delivered, leaving alert buffered"
                );
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::memory_bus::InMemoryMessageBus;

    fn record(tag: &str) -> OutboundRecord {
        OutboundRecord {
            exchange: "ALERT_EXCHANGE".to_string(),
            routing_key: "alert_router.system".to_string(),
            body: serde_json::json!({"tag": tag}),
        }
    }

    #[test]
    fn push_drops_oldest_when_full() {
        let mut buffer = PublishingBuffer::new(2);
        buffer.push(record("a"));
        buffer.push(record("b"));
        buffer.push(record("c"));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.records[0].body["tag"], "b");
        assert_eq!(buffer.records[1].body["tag"], "c");
    }

    #[tokio::test]
    async fn drain_removes_confirmed_records_in_order() {
        let bus = InMemoryMessageBus::new();
        bus.declare_queue_bound("sink", "ALERT_EXCHANGE", "alert_router.system")
            .await
            .unwrap();

        let mut buffer = PublishingBuffer::new(10);
        buffer.push(record("a"));
        buffer.push(record("b"));

        buffer.drain(&bus).await.unwrap();
        assert!(buffer.is_empty());

        let first = bus.consume("sink").await.unwrap();
        let first_body: serde_json::Value = serde_json::from_slice(&first.body).unwrap();
        assert_eq!(first_body["tag"], "a");
    }

    #[tokio::test]
    async fn drain_leaves_undelivered_records_buffered() {
        let bus = InMemoryMessageBus::new();
        // No binding declared: nothing is routable, so nothing is confirmed.
        let mut buffer = PublishingBuffer::new(10);
        buffer.push(record("a"));

        buffer.drain(&bus).await.unwrap();
        assert_eq!(buffer.len(), 1);
    }
}
