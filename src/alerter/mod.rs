//! The System Alerter: ingestion loop, classification, and the bridge
//! between the message bus and the publishing buffer.

mod state;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::alerts::system_alerts;
use crate::alerts::{Alert, AlertKind, Severity};
use crate::config::{AlertsConfig, Metric};
use crate::errors::{AlerterError, AlerterResult};
use crate::messaging::envelope::{
    decode_envelope, routing_key_contains_parent, ErrorPayload, IncomingEnvelope, ResultMetaData,
    ResultPayload,
};
use crate::messaging::{Delivery, MessageBus};
use crate::publishing_buffer::{OutboundRecord, PublishingBuffer};
use crate::timing::Timestamp;

pub use state::SystemState;

const ALERT_EXCHANGE: &str = "ALERT_EXCHANGE";
const HEALTH_CHECK_EXCHANGE: &str = "HEALTH_CHECK_EXCHANGE";
const ALERT_ROUTING_KEY: &str = "alert_router.system";
const HEARTBEAT_ROUTING_KEY: &str = "heartbeat.worker";

/// Error code meanings recognized in the error path.
const ERR_METRIC_NOT_FOUND: i64 = 5003;
const ERR_INVALID_URL: i64 = 5009;
const ERR_SYSTEM_UNREACHABLE: i64 = 5004;

/// Threshold classifier and downtime tracker for one monitored group
/// (one `parent_id`), driven by deliveries on a single queue.
pub struct SystemAlerter {
    component_name: String,
    config: AlertsConfig,
    states: HashMap<String, SystemState>,
    buffer: PublishingBuffer,
    bus: Arc<dyn MessageBus>,
    queue_name: String,
}

impl SystemAlerter {
    pub fn new(
        component_name: impl Into<String>,
        config: AlertsConfig,
        bus: Arc<dyn MessageBus>,
        buffer_capacity: usize,
    ) -> Self {
        let queue_name = format!("system_alerter_queue_{}", config.parent_id);
        Self {
            component_name: component_name.into(),
            config,
            states: HashMap::new(),
            buffer: PublishingBuffer::new(buffer_capacity),
            bus,
            queue_name,
        }
    }

    /// Declare exchanges, queue and bindings, and set prefetch to
    /// one-fifth of the publishing buffer capacity.
    pub async fn initialize(&self) -> AlerterResult<()> {
        self.bus.connect_till_successful().await?;
        self.bus.declare_topic_exchange(ALERT_EXCHANGE).await?;
        self.bus.declare_topic_exchange(HEALTH_CHECK_EXCHANGE).await?;

        let routing_key = format!("alerter.system.{}", self.config.parent_id);
        self.bus
            .declare_queue_bound(&self.queue_name, ALERT_EXCHANGE, &routing_key)
            .await?;

        let prefetch = (self.buffer.capacity() as f64 / 5.0).ceil() as u16;
        self.bus.set_prefetch(prefetch.max(1)).await?;
        Ok(())
    }

    /// Consume deliveries until the bus returns a transport error.
    pub async fn run(&mut self) -> AlerterResult<()> {
        loop {
            let delivery = self.bus.consume(&self.queue_name).await?;
            self.process_delivery(delivery).await?;
        }
    }

    /// Graceful shutdown on `SIGTERM`/`SIGINT`/`SIGHUP`: release the
    /// broker connection, the scoped resource acquired in
    /// [`Self::initialize`]. Safe to call even if the connection was
    /// never fully established.
    pub async fn shutdown(&self) -> AlerterResult<()> {
        self.bus.disconnect().await
    }

    /// Handle one delivery end to end: classify, ack unconditionally,
    /// and only on success push/drain/heartbeat.
    async fn process_delivery(&mut self, delivery: Delivery) -> AlerterResult<()> {
        let outcome = self.classify_delivery(&delivery);

        self.bus.ack(&self.queue_name, &delivery).await?;

        let alerts = match outcome {
            Ok(alerts) => alerts,
            Err(err) => {
                error!(routing_key = %delivery.routing_key, error = %err, "delivery not classified");
                return Ok(());
            }
        };

        for alert in &alerts {
            debug!(alert_code = ?alert.alert_code, severity = ?alert.severity, "classified alert");
            self.buffer.push(OutboundRecord {
                exchange: ALERT_EXCHANGE.to_string(),
                routing_key: ALERT_ROUTING_KEY.to_string(),
                body: serde_json::to_value(alert).expect("Alert always serializes"),
            });
        }

        self.buffer.drain(self.bus.as_ref()).await?;
        self.emit_heartbeat().await?;
        Ok(())
    }

    async fn emit_heartbeat(&self) -> AlerterResult<()> {
        let heartbeat = serde_json::json!({
            "component_name": self.component_name,
            "timestamp": Utc::now().timestamp() as f64,
        });
        match self
            .bus
            .publish_confirmed(HEALTH_CHECK_EXCHANGE, HEARTBEAT_ROUTING_KEY, heartbeat, true)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!("heartbeat publish was not confirmed");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn classify_delivery(&mut self, delivery: &Delivery) -> AlerterResult<Vec<Alert>> {
        if !routing_key_contains_parent(&delivery.routing_key, &self.config.parent_id) {
            return Err(AlerterError::UnexpectedData(format!(
                "routing key {:?} does not carry configured parent_id {:?}",
                delivery.routing_key, self.config.parent_id
            )));
        }

        // Borrowed as separate fields (not through a method call) so the
        // state lookup and the config reference can coexist.
        let config = &self.config;
        let states = &mut self.states;

        match decode_envelope(&delivery.body)? {
            IncomingEnvelope::Result(payload) => {
                let state = states
                    .entry(payload.meta_data.system_id.clone())
                    .or_insert_with(|| SystemState::new(config));
                Ok(classify_result(config, state, &payload))
            }
            IncomingEnvelope::Error(payload) => {
                let state = states
                    .entry(payload.meta_data.system_id.clone())
                    .or_insert_with(|| SystemState::new(config));
                Ok(classify_error(config, state, &payload))
            }
        }
    }
}

/// Classify a `result` delivery: the downtime BackUp transition plus
/// independent per-metric threshold classification.
fn classify_result(config: &AlertsConfig, state: &mut SystemState, payload: &ResultPayload) -> Vec<Alert> {
    let meta = &payload.meta_data;
    let mut alerts = Vec::new();

    let down_spec = config.spec(Metric::SystemIsDown);
    if down_spec.enabled && payload.data.went_down_at.previous.is_some() {
        info!(system_id = %meta.system_id, "system back up");
        alerts.push(system_alerts::back_up_again(
            &meta.system_name,
            meta.last_monitored,
            &meta.system_parent_id,
            &meta.system_id,
        ));
        state.initial_downtime_alert_sent = false;
        state.limiter_mut(Metric::SystemIsDown).reset();
    }

    let metrics: [(Metric, Option<f64>, Option<f64>, AlertKind, AlertKind); 4] = [
        (
            Metric::OpenFileDescriptors,
            payload.data.open_file_descriptors.current,
            payload.data.open_file_descriptors.previous,
            AlertKind::OpenFileDescriptorsIncreasedAboveThreshold,
            AlertKind::OpenFileDescriptorsDecreasedBelowThreshold,
        ),
        (
            Metric::SystemStorageUsage,
            payload.data.system_storage_usage.current,
            payload.data.system_storage_usage.previous,
            AlertKind::SystemStorageUsageIncreasedAboveThreshold,
            AlertKind::SystemStorageUsageDecreasedBelowThreshold,
        ),
        (
            Metric::SystemCpuUsage,
            payload.data.system_cpu_usage.current,
            payload.data.system_cpu_usage.previous,
            AlertKind::SystemCpuUsageIncreasedAboveThreshold,
            AlertKind::SystemCpuUsageDecreasedBelowThreshold,
        ),
        (
            // Classified against its own RAM config, not CPU's.
            Metric::SystemRamUsage,
            payload.data.system_ram_usage.current,
            payload.data.system_ram_usage.previous,
            AlertKind::SystemRamUsageIncreasedAboveThreshold,
            AlertKind::SystemRamUsageDecreasedBelowThreshold,
        ),
    ];

    for (metric, current, previous, increased_kind, decreased_kind) in metrics {
        if !config.spec(metric).enabled {
            continue;
        }
        let current = match current {
            Some(c) => c,
            None => continue,
        };
        if previous == Some(current) {
            continue;
        }
        // A missing previous sample behaves as negative infinity: it
        // can never satisfy a `threshold <= previous` guard, so a
        // metric's first-ever reading can only be classified as an
        // increase, never a spurious decrease.
        let previous = previous.unwrap_or(f64::NEG_INFINITY);
        classify_metric(
            metric,
            current,
            previous,
            config,
            state,
            meta,
            increased_kind,
            decreased_kind,
            &mut alerts,
        );
    }

    alerts
}

/// Warning/critical hysteresis for a single metric.
#[allow(clippy::too_many_arguments)]
fn classify_metric(
    metric: Metric,
    current: f64,
    previous: f64,
    config: &AlertsConfig,
    state: &mut SystemState,
    meta: &ResultMetaData,
    increased_kind: AlertKind,
    decreased_kind: AlertKind,
    alerts: &mut Vec<Alert>,
) {
    let spec = config.spec(metric);
    let now = Timestamp::from_unix_secs(meta.last_monitored);

    if spec.warning_enabled {
        if let (Some(w), Some(c)) = (spec.warning_threshold, spec.critical_threshold) {
            if w <= current && current < c && !(w <= previous) {
                alerts.push(system_alerts::increased_above_threshold(
                    increased_kind,
                    &meta.system_name,
                    current,
                    Severity::Warning,
                    meta.last_monitored,
                    &meta.system_parent_id,
                    &meta.system_id,
                ));
            } else if current < w && w <= previous {
                alerts.push(system_alerts::decreased_below_threshold(
                    decreased_kind,
                    &meta.system_name,
                    current,
                    meta.last_monitored,
                    &meta.system_parent_id,
                    &meta.system_id,
                ));
            }
        }
    }

    if spec.critical_enabled {
        if let Some(c) = spec.critical_threshold {
            let limiter = state.limiter_mut(metric);
            if current >= c && limiter.can_do(now) {
                alerts.push(system_alerts::increased_above_threshold(
                    increased_kind,
                    &meta.system_name,
                    current,
                    Severity::Critical,
                    meta.last_monitored,
                    &meta.system_parent_id,
                    &meta.system_id,
                ));
                limiter.record(now);
            } else if let Some(w) = spec.warning_threshold {
                if w < current && current < c && c <= previous {
                    alerts.push(system_alerts::decreased_below_threshold(
                        decreased_kind,
                        &meta.system_name,
                        current,
                        meta.last_monitored,
                        &meta.system_parent_id,
                        &meta.system_id,
                    ));
                    limiter.reset();
                }
            }
        }
    }
}

/// Classify an `error` delivery.
fn classify_error(config: &AlertsConfig, state: &mut SystemState, payload: &ErrorPayload) -> Vec<Alert> {
    let meta = &payload.meta_data;
    match payload.code {
        ERR_METRIC_NOT_FOUND => vec![system_alerts::metric_not_found(
            &payload.message,
            meta.time,
            &meta.system_parent_id,
            &meta.system_id,
        )],
        ERR_INVALID_URL => vec![system_alerts::invalid_url(
            &payload.message,
            meta.time,
            &meta.system_parent_id,
            &meta.system_id,
        )],
        ERR_SYSTEM_UNREACHABLE => classify_downtime(config, state, payload),
        other => {
            debug!(code = other, "unrecognized error code, ignoring");
            Vec::new()
        }
    }
}

/// The downtime state machine, driven by error code 5004.
fn classify_downtime(config: &AlertsConfig, state: &mut SystemState, payload: &ErrorPayload) -> Vec<Alert> {
    let spec = config.spec(Metric::SystemIsDown);
    if !spec.enabled {
        return Vec::new();
    }

    let meta = &payload.meta_data;
    let went_down_at = match payload.data.went_down_at.current {
        Some(v) => v,
        None => return Vec::new(),
    };

    let now = Timestamp::from_unix_secs(meta.time);
    let downtime = (meta.time - went_down_at).max(0.0);
    let mut alerts = Vec::new();

    if !state.initial_downtime_alert_sent {
        if spec.critical_enabled && spec.critical_threshold.is_some_and(|c| downtime >= c) {
            alerts.push(system_alerts::went_down(
                &meta.system_name,
                Severity::Critical,
                meta.time,
                &meta.system_parent_id,
                &meta.system_id,
            ));
            state.limiter_mut(Metric::SystemIsDown).record(now);
            state.initial_downtime_alert_sent = true;
        } else if spec.warning_enabled && spec.warning_threshold.is_some_and(|w| downtime >= w) {
            alerts.push(system_alerts::went_down(
                &meta.system_name,
                Severity::Warning,
                meta.time,
                &meta.system_parent_id,
                &meta.system_id,
            ));
            state.limiter_mut(Metric::SystemIsDown).record(now);
            state.initial_downtime_alert_sent = true;
        }
    } else {
        let limiter = state.limiter_mut(Metric::SystemIsDown);
        if spec.critical_enabled && limiter.can_do(now) {
            alerts.push(system_alerts::still_down(
                &meta.system_name,
                downtime,
                Severity::Critical,
                meta.time,
                &meta.system_parent_id,
                &meta.system_id,
            ));
            limiter.record(now);
        }
    }

    alerts
}
