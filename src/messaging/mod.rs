//! Message bus boundary.
//!
//! The real broker client is explicitly out of scope (see the design's
//! purpose and scope section) — it is an external collaborator. This
//! module defines the contract the alerter and manager consume
//! ([`MessageBus`]) and the wire envelope shapes they decode, plus an
//! in-memory adapter ([`memory_bus::InMemoryMessageBus`]) good enough
//! to run the binaries locally and to drive the test suite without a
//! real AMQP broker.

pub mod envelope;
pub mod memory_bus;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AlerterResult;

/// A single inbound delivery: the routing key it arrived on and its
/// raw JSON body.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
}

/// The capability the core consumes for topic-exchange publish/subscribe
/// with publisher confirms. Mirrors the RabbitMQ contract in the
/// design's external interfaces section, but is broker-agnostic: a real
/// implementation could be backed by any broker that offers durable
/// topic exchanges, manual ack, and delivery confirms.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Block (retrying with the adapter's own backoff policy) until
    /// connected.
    async fn connect_till_successful(&self) -> AlerterResult<()>;

    /// Declare a durable, non-auto-delete topic exchange.
    async fn declare_topic_exchange(&self, exchange: &str) -> AlerterResult<()>;

    /// Declare a durable queue and bind it to `exchange` with
    /// `routing_key`.
    async fn declare_queue_bound(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> AlerterResult<()>;

    /// Set the prefetch (QoS) count for subsequent consumption.
    async fn set_prefetch(&self, count: u16) -> AlerterResult<()>;

    /// Wait for and return the next delivery on `queue`, in FIFO order.
    async fn consume(&self, queue: &str) -> AlerterResult<Delivery>;

    /// Acknowledge a delivery previously returned by [`Self::consume`].
    async fn ack(&self, queue: &str, delivery: &Delivery) -> AlerterResult<()>;

    /// Publish with a publisher confirm. Returns `Ok(true)` if the
    /// broker confirmed routing, `Ok(false)` if it reported the message
    /// unroutable (the not-delivered case); `mandatory` mirrors the
    /// AMQP `mandatory` flag.
    async fn publish_confirmed(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Value,
        mandatory: bool,
    ) -> AlerterResult<bool>;

    /// Tear down the connection. Must be safe to call more than once.
    async fn disconnect(&self) -> AlerterResult<()>;
}
