//! Builders for each concrete system alert, one per upstream alert
//! class (`SystemCPUUsageIncreasedAboveThresholdAlert`,
//! `SystemWentDownAtAlert`, ...). Each builder just fixes the
//! `alert_code` and formats a human-readable `message`; the
//! classification logic that decides *when* to call them lives in
//! [`crate::alerter`].

use super::{Alert, AlertKind, Severity};

fn metric_label(kind: AlertKind) -> &'static str {
    kind.metric().map(|m| m.key()).unwrap_or("system")
}

/// A usage metric crossed above its warning or critical threshold.
pub fn increased_above_threshold(
    kind: AlertKind,
    system_name: &str,
    current: f64,
    severity: Severity,
    timestamp: f64,
    parent_id: &str,
    system_id: &str,
) -> Alert {
    let message = format!(
        "{} of {} increased above threshold, now at {:.2}",
        metric_label(kind),
        system_name,
        current
    );
    Alert::new(
        severity,
        message,
        timestamp,
        parent_id,
        system_id,
        kind,
        Some(current),
    )
}

/// A usage metric dropped back below its warning or critical band.
/// Always informational: the system returning to normal is not itself
/// an actionable severity.
pub fn decreased_below_threshold(
    kind: AlertKind,
    system_name: &str,
    current: f64,
    timestamp: f64,
    parent_id: &str,
    system_id: &str,
) -> Alert {
    let message = format!(
        "{} of {} decreased below threshold, now at {:.2}",
        metric_label(kind),
        system_name,
        current
    );
    Alert::new(
        Severity::Info,
        message,
        timestamp,
        parent_id,
        system_id,
        kind,
        Some(current),
    )
}

/// The system was just classified as down.
pub fn went_down(
    system_name: &str,
    severity: Severity,
    timestamp: f64,
    parent_id: &str,
    system_id: &str,
) -> Alert {
    let message = format!("{} is down, currently unreachable", system_name);
    Alert::new(
        severity,
        message,
        timestamp,
        parent_id,
        system_id,
        AlertKind::SystemWentDown,
        None,
    )
}

/// The system remains down and the critical repeat interval allows
/// another alert.
pub fn still_down(
    system_name: &str,
    downtime_secs: f64,
    severity: Severity,
    timestamp: f64,
    parent_id: &str,
    system_id: &str,
) -> Alert {
    let message = format!(
        "{} is still down, has been unreachable for {:.0}s",
        system_name, downtime_secs
    );
    Alert::new(
        severity,
        message,
        timestamp,
        parent_id,
        system_id,
        AlertKind::SystemStillDown,
        Some(downtime_secs),
    )
}

/// The system recovered.
pub fn back_up_again(
    system_name: &str,
    timestamp: f64,
    parent_id: &str,
    system_id: &str,
) -> Alert {
    let message = format!("{} is back up", system_name);
    Alert::new(
        Severity::Info,
        message,
        timestamp,
        parent_id,
        system_id,
        AlertKind::SystemBackUpAgain,
        None,
    )
}

/// Error code 5003: the upstream transformer could not find the metric
/// it was asked to report.
pub fn metric_not_found(message: &str, timestamp: f64, parent_id: &str, system_id: &str) -> Alert {
    Alert::new(
        Severity::Error,
        message.to_string(),
        timestamp,
        parent_id,
        system_id,
        AlertKind::MetricNotFoundError,
        None,
    )
}

/// Error code 5009: the upstream transformer was configured with an
/// invalid URL for this system.
pub fn invalid_url(message: &str, timestamp: f64, parent_id: &str, system_id: &str) -> Alert {
    Alert::new(
        Severity::Error,
        message.to_string(),
        timestamp,
        parent_id,
        system_id,
        AlertKind::InvalidUrlError,
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increased_above_threshold_carries_the_value() {
        let alert = increased_above_threshold(
            AlertKind::SystemCpuUsageIncreasedAboveThreshold,
            "node-1",
            95.0,
            Severity::Critical,
            1_700_000_000.0,
            "parent-1",
            "system-1",
        );
        assert_eq!(alert.value, Some(95.0));
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.metric, Some("system_cpu_usage"));
    }

    #[test]
    fn decreased_below_threshold_is_always_info() {
        let alert = decreased_below_threshold(
            AlertKind::SystemCpuUsageDecreasedBelowThreshold,
            "node-1",
            60.0,
            1_700_000_000.0,
            "parent-1",
            "system-1",
        );
        assert_eq!(alert.severity, Severity::Info);
    }
}
