//! An in-memory stand-in for a real broker client.
//!
//! This is deliberately simple: exchanges and queues live in a
//! `std::sync::Mutex`-guarded map, routing is exact-match (every queue
//! this crate binds uses a fixed literal routing key, never a
//! wildcard pattern), and publisher confirms are synthesized from
//! whether any queue is bound to receive the message. It exists so the
//! binaries can run end to end without a broker, and so tests can
//! drive the alerter and manager deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;

use super::{Delivery, MessageBus};
use crate::errors::AlerterResult;

#[derive(Default)]
struct Bindings {
    /// exchange -> queue -> routing key it is bound with.
    queue_routing_key: HashMap<String, (String, String)>,
    /// queue -> pending deliveries, FIFO.
    queues: HashMap<String, VecDeque<Delivery>>,
}

pub struct InMemoryMessageBus {
    state: Mutex<Bindings>,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Bindings::default()),
        }
    }

    /// Directly inject a delivery as if it had been published by an
    /// upstream producer, bypassing the publish/route machinery. Used
    /// by tests to feed the alerter fixed scenarios.
    pub fn inject(&self, queue: &str, routing_key: &str, body: &Value) {
        let mut state = self.state.lock().unwrap();
        let entry = state.queues.entry(queue.to_string()).or_default();
        entry.push_back(Delivery {
            routing_key: routing_key.to_string(),
            body: serde_json::to_vec(body).expect("serializing injected body"),
        });
    }

    /// Non-blocking poll, used internally by [`MessageBus::consume`].
    fn try_consume(&self, queue: &str) -> Option<Delivery> {
        let mut state = self.state.lock().unwrap();
        state.queues.get_mut(queue).and_then(|q| q.pop_front())
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn connect_till_successful(&self) -> AlerterResult<()> {
        Ok(())
    }

    async fn declare_topic_exchange(&self, _exchange: &str) -> AlerterResult<()> {
        Ok(())
    }

    async fn declare_queue_bound(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> AlerterResult<()> {
        let mut state = self.state.lock().unwrap();
        state.queues.entry(queue.to_string()).or_default();
        state
            .queue_routing_key
            .insert(queue.to_string(), (exchange.to_string(), routing_key.to_string()));
        Ok(())
    }

    async fn set_prefetch(&self, _count: u16) -> AlerterResult<()> {
        Ok(())
    }

    async fn consume(&self, queue: &str) -> AlerterResult<Delivery> {
        loop {
            if let Some(delivery) = self.try_consume(queue) {
                return Ok(delivery);
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn ack(&self, _queue: &str, _delivery: &Delivery) -> AlerterResult<()> {
        Ok(())
    }

    async fn publish_confirmed(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Value,
        _mandatory: bool,
    ) -> AlerterResult<bool> {
        let mut state = self.state.lock().unwrap();
        let mut delivered_to_any = false;
        let matching_queues: Vec<String> = state
            .queue_routing_key
            .iter()
            .filter(|(_, (ex, rk))| ex == exchange && rk == routing_key)
            .map(|(queue, _)| queue.clone())
            .collect();

        for queue in matching_queues {
            if let Some(q) = state.queues.get_mut(&queue) {
                q.push_back(Delivery {
                    routing_key: routing_key.to_string(),
                    body: serde_json::to_vec(&body).expect("serializing published body"),
                });
                delivered_to_any = true;
            }
        }
        Ok(delivered_to_any)
    }

    async fn disconnect(&self) -> AlerterResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_routes_to_bound_queue() {
        let bus = InMemoryMessageBus::new();
        bus.declare_topic_exchange("ALERT_EXCHANGE").await.unwrap();
        bus.declare_queue_bound("q1", "ALERT_EXCHANGE", "alert_router.system")
            .await
            .unwrap();

        let delivered = bus
            .publish_confirmed(
                "ALERT_EXCHANGE",
                "alert_router.system",
                serde_json::json!({"hello": "world"}),
                true,
            )
            .await
            .unwrap();
        assert!(delivered);

        let delivery = bus.consume("q1").await.unwrap();
        assert_eq!(delivery.routing_key, "alert_router.system");
    }

    #[tokio::test]
    async fn publish_with_no_binding_is_not_delivered() {
        let bus = InMemoryMessageBus::new();
        let delivered = bus
            .publish_confirmed("ALERT_EXCHANGE", "nobody.listens", serde_json::json!({}), true)
            .await
            .unwrap();
        assert!(!delivered);
    }
}
