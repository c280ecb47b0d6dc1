//! Typed alerting configuration.
//!
//! Upstream, threshold configuration arrives as a loosely typed
//! dictionary: `"true"`/`"false"` strings and stringified numbers,
//! because the same config blob is shared with a dynamically typed
//! Python component elsewhere in the platform. This module normalizes
//! that shape exactly once, at load time, into [`AlertsConfig`] so the
//! rest of the crate never touches a string where it means a bool or a
//! float.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// The five metrics the system alerter classifies, plus their fixed
/// critical-limiter names (matching the routing keys and limiter map
/// keys used upstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    OpenFileDescriptors,
    SystemCpuUsage,
    SystemStorageUsage,
    SystemRamUsage,
    SystemIsDown,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::OpenFileDescriptors,
        Metric::SystemCpuUsage,
        Metric::SystemStorageUsage,
        Metric::SystemRamUsage,
        Metric::SystemIsDown,
    ];

    /// The limiter map key / upstream config key for this metric.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::OpenFileDescriptors => "open_file_descriptors",
            Metric::SystemCpuUsage => "system_cpu_usage",
            Metric::SystemStorageUsage => "system_storage_usage",
            Metric::SystemRamUsage => "system_ram_usage",
            Metric::SystemIsDown => "system_is_down",
        }
    }
}

/// A normalized, per-metric threshold specification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSpec {
    pub enabled: bool,
    pub warning_enabled: bool,
    pub critical_enabled: bool,
    pub warning_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,
    pub critical_repeat: Duration,
}

impl ThresholdSpec {
    /// Build a spec directly from typed values, for tests and
    /// programmatic construction.
    pub fn new(
        enabled: bool,
        warning_enabled: bool,
        critical_enabled: bool,
        warning_threshold: Option<f64>,
        critical_threshold: Option<f64>,
        critical_repeat_secs: u64,
    ) -> Self {
        Self {
            enabled,
            warning_enabled,
            critical_enabled,
            warning_threshold,
            critical_threshold,
            critical_repeat: Duration::from_secs(critical_repeat_secs),
        }
    }

    fn from_raw(raw: &RawThresholdSpec) -> Result<Self> {
        Ok(Self {
            enabled: str_to_bool(&raw.enabled)?,
            warning_enabled: str_to_bool(&raw.warning_enabled)?,
            critical_enabled: str_to_bool(&raw.critical_enabled)?,
            warning_threshold: parse_optional_f64(&raw.warning_threshold)?,
            critical_threshold: parse_optional_f64(&raw.critical_threshold)?,
            critical_repeat: Duration::from_secs(
                raw.critical_repeat
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid critical_repeat: {:?}", raw.critical_repeat))?,
            ),
        })
    }
}

/// The on-disk / dynamic-dict shape: every field is a string, mirroring
/// the upstream config format before normalization.
#[derive(Debug, Clone, Deserialize)]
struct RawThresholdSpec {
    enabled: String,
    warning_enabled: String,
    critical_enabled: String,
    #[serde(default)]
    warning_threshold: String,
    #[serde(default)]
    critical_threshold: String,
    critical_repeat: String,
}

/// Per monitored-group alerting configuration: a `parent_id` plus one
/// threshold spec per metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertsConfig {
    pub parent_id: String,
    pub open_file_descriptors: ThresholdSpec,
    pub system_cpu_usage: ThresholdSpec,
    pub system_storage_usage: ThresholdSpec,
    pub system_ram_usage: ThresholdSpec,
    pub system_is_down: ThresholdSpec,
}

impl AlertsConfig {
    /// Look up the spec for a given metric.
    pub fn spec(&self, metric: Metric) -> &ThresholdSpec {
        match metric {
            Metric::OpenFileDescriptors => &self.open_file_descriptors,
            Metric::SystemCpuUsage => &self.system_cpu_usage,
            Metric::SystemStorageUsage => &self.system_storage_usage,
            Metric::SystemRamUsage => &self.system_ram_usage,
            Metric::SystemIsDown => &self.system_is_down,
        }
    }

    /// Load and normalize configuration from a TOML file shaped like
    /// the raw upstream dictionary (string-typed fields).
    pub fn load_from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading alerts config at {}", path.display()))?;
        let raw: RawAlertsConfig = toml::from_str(&content)
            .with_context(|| format!("parsing alerts config at {}", path.display()))?;
        raw.normalize()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawAlertsConfig {
    parent_id: String,
    open_file_descriptors: RawThresholdSpec,
    system_cpu_usage: RawThresholdSpec,
    system_storage_usage: RawThresholdSpec,
    system_ram_usage: RawThresholdSpec,
    system_is_down: RawThresholdSpec,
}

impl RawAlertsConfig {
    fn normalize(&self) -> Result<AlertsConfig> {
        Ok(AlertsConfig {
            parent_id: self.parent_id.clone(),
            open_file_descriptors: ThresholdSpec::from_raw(&self.open_file_descriptors)?,
            system_cpu_usage: ThresholdSpec::from_raw(&self.system_cpu_usage)?,
            system_storage_usage: ThresholdSpec::from_raw(&self.system_storage_usage)?,
            system_ram_usage: ThresholdSpec::from_raw(&self.system_ram_usage)?,
            system_is_down: ThresholdSpec::from_raw(&self.system_is_down)?,
        })
    }
}

/// Parse a loose `"true"`/`"false"` (case-insensitive) string into a bool.
fn str_to_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(anyhow!("expected \"true\" or \"false\", got {:?}", other)),
    }
}

/// Parse a stringified float, treating an empty/absent string as `None`
/// the way the upstream dictionary represents an unset threshold.
fn parse_optional_f64(value: &str) -> Result<Option<f64>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(
        trimmed
            .parse()
            .with_context(|| format!("invalid threshold value: {:?}", value))?,
    ))
}

/// Process-wide runtime settings read from the environment, mirroring
/// the `RABBIT_IP` / buffer-size knobs named in the external interface.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub rabbit_ip: String,
    pub publisher_buffer_capacity: usize,
    pub log_level: String,
}

impl RuntimeSettings {
    /// Default publisher buffer capacity, matching the upstream default.
    pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

    /// Read settings from environment variables, applying defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();

        let rabbit_ip = env
            .get("RABBIT_IP")
            .cloned()
            .ok_or_else(|| anyhow!("RABBIT_IP must be set"))?;

        let publisher_buffer_capacity = match env.get("ALERTER_PUBLISHER_BUFFER_SIZE") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid ALERTER_PUBLISHER_BUFFER_SIZE: {:?}", raw))?,
            None => Self::DEFAULT_BUFFER_CAPACITY,
        };

        let log_level = env
            .get("ALERTER_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            rabbit_ip,
            publisher_buffer_capacity,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_to_bool_accepts_common_casings() {
        assert!(str_to_bool("true").unwrap());
        assert!(str_to_bool("TRUE").unwrap());
        assert!(!str_to_bool("false").unwrap());
        assert!(str_to_bool("yes").is_err());
    }

    #[test]
    fn parse_optional_f64_treats_empty_as_absent() {
        assert_eq!(parse_optional_f64("").unwrap(), None);
        assert_eq!(parse_optional_f64("70").unwrap(), Some(70.0));
        assert_eq!(parse_optional_f64("70.5").unwrap(), Some(70.5));
    }

    #[test]
    fn loads_and_normalizes_toml_config() {
        let toml_src = r#"
            parent_id = "chain-1"

            [open_file_descriptors]
            enabled = "true"
            warning_enabled = "true"
            critical_enabled = "true"
            warning_threshold = "85"
            critical_threshold = "95"
            critical_repeat = "300"

            [system_cpu_usage]
            enabled = "true"
            warning_enabled = "true"
            critical_enabled = "true"
            warning_threshold = "70"
            critical_threshold = "90"
            critical_repeat = "600"

            [system_storage_usage]
            enabled = "false"
            warning_enabled = "false"
            critical_enabled = "false"
            warning_threshold = ""
            critical_threshold = ""
            critical_repeat = "600"

            [system_ram_usage]
            enabled = "true"
            warning_enabled = "true"
            critical_enabled = "true"
            warning_threshold = "80"
            critical_threshold = "95"
            critical_repeat = "600"

            [system_is_down]
            enabled = "true"
            warning_enabled = "true"
            critical_enabled = "true"
            warning_threshold = "10"
            critical_threshold = "20"
            critical_repeat = "300"
        "#;

        let dir = std::env::temp_dir().join(format!(
            "node_alerter_test_config_{:?}",
            std::thread::current().id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("alerts.toml");
        fs::write(&path, toml_src).unwrap();

        let config = AlertsConfig::load_from_toml(&path).unwrap();
        assert_eq!(config.parent_id, "chain-1");
        assert!(config.system_cpu_usage.enabled);
        assert_eq!(config.system_cpu_usage.warning_threshold, Some(70.0));
        assert_eq!(
            config.system_cpu_usage.critical_repeat,
            Duration::from_secs(600)
        );
        assert!(!config.system_storage_usage.enabled);
        assert_eq!(config.system_storage_usage.warning_threshold, None);

        fs::remove_file(&path).ok();
        fs::remove_dir(&dir).ok();
    }
}
