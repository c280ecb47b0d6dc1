//! The Transformer Manager: supervises a fixed, named set of child
//! worker processes and answers liveness pings with a heartbeat.

pub mod child;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::errors::AlerterResult;
use crate::messaging::MessageBus;
use child::ChildHandle;

const HEALTH_CHECK_EXCHANGE: &str = "HEALTH_CHECK_EXCHANGE";
const PING_QUEUE: &str = "data_transformers_manager_queue";
const PING_ROUTING_KEY: &str = "ping";
const HEARTBEAT_ROUTING_KEY: &str = "heartbeat.manager";

/// Supervises the named children, restarting dead ones and answering
/// `ping` deliveries with a `{running, dead, timestamp}` heartbeat.
pub struct TransformerManager {
    component_name: String,
    children: HashMap<String, Box<dyn ChildHandle>>,
    bus: Arc<dyn MessageBus>,
}

impl TransformerManager {
    pub fn new(
        component_name: impl Into<String>,
        children: HashMap<String, Box<dyn ChildHandle>>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            component_name: component_name.into(),
            children,
            bus,
        }
    }

    pub async fn initialize(&self) -> AlerterResult<()> {
        self.bus.connect_till_successful().await?;
        self.bus.declare_topic_exchange(HEALTH_CHECK_EXCHANGE).await?;
        self.bus
            .declare_queue_bound(PING_QUEUE, HEALTH_CHECK_EXCHANGE, PING_ROUTING_KEY)
            .await?;
        Ok(())
    }

    /// Ensure every named child is running, then block answering pings
    /// until the bus returns a transport error.
    pub async fn run(&mut self) -> AlerterResult<()> {
        self.start_missing().await?;

        loop {
            // The ping queue is auto-ack: no explicit ack call.
            self.bus.consume(PING_QUEUE).await?;
            self.handle_ping().await?;
        }
    }

    async fn handle_ping(&mut self) -> AlerterResult<()> {
        let mut running = Vec::new();
        let mut dead = Vec::new();

        for (name, child) in self.children.iter_mut() {
            if child.is_alive() {
                running.push(name.clone());
            } else {
                child.join().await?;
                dead.push(name.clone());
            }
        }

        if !dead.is_empty() {
            warn!(?dead, "dead transformer children found, restarting before heartbeat");
            self.start_missing().await?;
        }

        let heartbeat = serde_json::json!({
            "component_name": self.component_name,
            "running": running,
            "dead": dead,
            "timestamp": Utc::now().timestamp() as f64,
        });

        match self
            .bus
            .publish_confirmed(HEALTH_CHECK_EXCHANGE, HEARTBEAT_ROUTING_KEY, heartbeat, true)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!("manager heartbeat was not delivered");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Start every child that is absent or dead.
    async fn start_missing(&mut self) -> AlerterResult<()> {
        for (name, child) in self.children.iter_mut() {
            if !child.is_alive() {
                info!(child = %name, "starting transformer child");
                child.start().await?;
            }
        }
        Ok(())
    }

    /// Graceful shutdown on `SIGTERM`/`SIGINT`/`SIGHUP`: disconnect the
    /// broker, then terminate and join every child.
    pub async fn shutdown(&mut self) -> AlerterResult<()> {
        if let Err(e) = self.bus.disconnect().await {
            error!(error = %e, "error disconnecting message bus during shutdown");
        }
        for (name, child) in self.children.iter_mut() {
            info!(child = %name, "terminating transformer child");
            child.terminate().await?;
            child.join().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use child::FakeChildHandle;
    use crate::messaging::memory_bus::InMemoryMessageBus;

    fn fake_manager(bus: Arc<InMemoryMessageBus>) -> TransformerManager {
        let mut children: HashMap<String, Box<dyn ChildHandle>> = HashMap::new();
        children.insert("system_data_transformer".to_string(), Box::new(FakeChildHandle::new()));
        children.insert("github_data_transformer".to_string(), Box::new(FakeChildHandle::new()));
        TransformerManager::new("transformer_manager", children, bus)
    }

    #[tokio::test]
    async fn start_missing_starts_every_absent_child() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut manager = fake_manager(bus);
        manager.start_missing().await.unwrap();

        for child in manager.children.values_mut() {
            assert!(child.is_alive());
        }
    }

    #[tokio::test]
    async fn ping_with_a_dead_child_heartbeats_it_dead_then_restarts_for_the_next_ping() {
        let bus = Arc::new(InMemoryMessageBus::new());
        bus.declare_queue_bound("sink", HEALTH_CHECK_EXCHANGE, HEARTBEAT_ROUTING_KEY)
            .await
            .unwrap();

        let mut manager = fake_manager(bus.clone());
        manager.start_missing().await.unwrap();

        {
            let child = manager
                .children
                .get_mut("github_data_transformer")
                .unwrap();
            child
                .as_any_mut()
                .downcast_mut::<FakeChildHandle>()
                .unwrap()
                .kill();
        }

        // The heartbeat reflects the pre-restart snapshot: the dead child
        // is reported dead on this ping, even though it gets restarted
        // before the heartbeat is sent.
        manager.handle_ping().await.unwrap();

        let delivery = bus.consume("sink").await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&delivery.body).unwrap();
        let running = body["running"].as_array().unwrap();
        let dead = body["dead"].as_array().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0], "github_data_transformer");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0], "system_data_transformer");

        // It was restarted as part of handling that ping, so the next
        // ping reports it running again.
        manager.handle_ping().await.unwrap();

        let second_delivery = bus.consume("sink").await.unwrap();
        let second_body: serde_json::Value = serde_json::from_slice(&second_delivery.body).unwrap();
        let second_running = second_body["running"].as_array().unwrap();
        let second_dead = second_body["dead"].as_array().unwrap();
        assert_eq!(second_dead.len(), 0);
        assert_eq!(second_running.len(), 2);
    }
}
