//! Per-`system_id` mutable state.

use std::collections::HashMap;

use crate::config::{AlertsConfig, Metric};
use crate::timing::RateLimiter;

/// State the alerter keeps for one monitored system. Lazily created on
/// first observation and never torn down for the lifetime of the
/// process (see the design's data model / lifecycle note) — only an
/// explicit BackUp transition resets its fields.
pub struct SystemState {
    pub initial_downtime_alert_sent: bool,
    critical_limiters: HashMap<Metric, RateLimiter>,
}

impl SystemState {
    pub fn new(config: &AlertsConfig) -> Self {
        let critical_limiters = Metric::ALL
            .into_iter()
            .map(|metric| (metric, RateLimiter::new(config.spec(metric).critical_repeat)))
            .collect();

        Self {
            initial_downtime_alert_sent: false,
            critical_limiters,
        }
    }

    pub fn limiter_mut(&mut self, metric: Metric) -> &mut RateLimiter {
        self.critical_limiters
            .get_mut(&metric)
            .expect("a limiter is initialized for every Metric variant in SystemState::new")
    }

    pub fn limiter(&self, metric: Metric) -> &RateLimiter {
        self.critical_limiters
            .get(&metric)
            .expect("a limiter is initialized for every Metric variant in SystemState::new")
    }
}
