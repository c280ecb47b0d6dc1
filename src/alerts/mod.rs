//! Alert records.
//!
//! An [`Alert`] is an immutable value object: once classification
//! builds one, nothing mutates it again before it is handed to the
//! publishing buffer. Field names on the wire match the downstream
//! alert router's compatibility contract exactly (see
//! `outgoing alert schema` in the design).

pub mod system_alerts;

use serde::{Deserialize, Serialize};

use crate::config::Metric;

/// Alert severity, ordered so `>=` comparisons (e.g. "at least
/// WARNING") behave as expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Error,
}

/// The kind of condition an alert reports, used as the `alert_code` on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    OpenFileDescriptorsIncreasedAboveThreshold,
    OpenFileDescriptorsDecreasedBelowThreshold,
    SystemCpuUsageIncreasedAboveThreshold,
    SystemCpuUsageDecreasedBelowThreshold,
    SystemStorageUsageIncreasedAboveThreshold,
    SystemStorageUsageDecreasedBelowThreshold,
    SystemRamUsageIncreasedAboveThreshold,
    SystemRamUsageDecreasedBelowThreshold,
    SystemWentDown,
    SystemStillDown,
    SystemBackUpAgain,
    MetricNotFoundError,
    InvalidUrlError,
}

impl AlertKind {
    /// The metric this alert kind was classified against, if any
    /// (downtime and error alerts carry no metric).
    pub fn metric(&self) -> Option<Metric> {
        use AlertKind::*;
        match self {
            OpenFileDescriptorsIncreasedAboveThreshold
            | OpenFileDescriptorsDecreasedBelowThreshold => Some(Metric::OpenFileDescriptors),
            SystemCpuUsageIncreasedAboveThreshold | SystemCpuUsageDecreasedBelowThreshold => {
                Some(Metric::SystemCpuUsage)
            }
            SystemStorageUsageIncreasedAboveThreshold
            | SystemStorageUsageDecreasedBelowThreshold => Some(Metric::SystemStorageUsage),
            SystemRamUsageIncreasedAboveThreshold | SystemRamUsageDecreasedBelowThreshold => {
                Some(Metric::SystemRamUsage)
            }
            SystemWentDown | SystemStillDown | SystemBackUpAgain => Some(Metric::SystemIsDown),
            MetricNotFoundError | InvalidUrlError => None,
        }
    }
}

/// An immutable alert record, ready for the publishing buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
    /// Unix seconds.
    pub timestamp: f64,
    pub parent_id: String,
    #[serde(rename = "origin_id")]
    pub system_id: String,
    pub alert_code: AlertKind,
    pub metric: Option<&'static str>,
    pub value: Option<f64>,
}

impl Alert {
    pub(crate) fn new(
        severity: Severity,
        message: String,
        timestamp: f64,
        parent_id: impl Into<String>,
        system_id: impl Into<String>,
        alert_code: AlertKind,
        value: Option<f64>,
    ) -> Self {
        Self {
            severity,
            message,
            timestamp,
            parent_id: parent_id.into(),
            system_id: system_id.into(),
            alert_code,
            metric: alert_code.metric().map(|m| m.key()),
            value,
        }
    }
}
