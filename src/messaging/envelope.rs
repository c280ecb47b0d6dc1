//! Incoming delivery envelopes.
//!
//! An inbound body is a tagged union discriminated by which top-level
//! key is present: `result` or `error`. Decoding into this explicit
//! envelope (rather than stringly probing `"result" in data`) makes the
//! "unexpected shape" case a real, matchable variant instead of a
//! fall-through branch.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::AlerterError;

/// `metric: { current, previous }` sample pair.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct MetricSample {
    pub current: Option<f64>,
    pub previous: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultMetaData {
    pub system_id: String,
    pub system_parent_id: String,
    pub system_name: String,
    pub last_monitored: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultData {
    pub open_file_descriptors: MetricSample,
    pub system_cpu_usage: MetricSample,
    pub system_storage_usage: MetricSample,
    pub system_ram_usage: MetricSample,
    pub went_down_at: MetricSample,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultPayload {
    pub data: ResultData,
    pub meta_data: ResultMetaData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMetaData {
    pub time: f64,
    pub system_id: String,
    pub system_parent_id: String,
    pub system_name: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ErrorDowntimeData {
    #[serde(default)]
    pub went_down_at: MetricSample,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub code: i64,
    pub message: String,
    pub meta_data: ErrorMetaData,
    #[serde(default)]
    pub data: ErrorDowntimeData,
}

/// The decoded shape of an inbound delivery body.
#[derive(Debug, Clone)]
pub enum IncomingEnvelope {
    Result(ResultPayload),
    Error(ErrorPayload),
}

/// Decode a raw delivery body into an [`IncomingEnvelope`].
///
/// Invalid JSON and a matched shape missing a required key both raise
/// [`AlerterError::Malformed`]; a well-formed JSON object with neither
/// `result` nor `error` at the top level raises
/// [`AlerterError::UnexpectedData`].
pub fn decode_envelope(body: &[u8]) -> Result<IncomingEnvelope, AlerterError> {
    let value: Value = serde_json::from_slice(body)?;

    if let Some(result) = value.get("result") {
        let payload: ResultPayload = serde_json::from_value(result.clone())?;
        Ok(IncomingEnvelope::Result(payload))
    } else if let Some(error) = value.get("error") {
        let payload: ErrorPayload = serde_json::from_value(error.clone())?;
        Ok(IncomingEnvelope::Error(payload))
    } else {
        Err(AlerterError::UnexpectedData(
            "delivery body has neither 'result' nor 'error' key".to_string(),
        ))
    }
}

/// Check that `parent_id` is a dot-separated component of
/// `routing_key`, mirroring the upstream
/// `parsed_routing_key = method.routing_key.split('.')` check.
pub fn routing_key_contains_parent(routing_key: &str, parent_id: &str) -> bool {
    routing_key.split('.').any(|part| part == parent_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_result_envelope() {
        let body = serde_json::json!({
            "result": {
                "data": {
                    "open_file_descriptors": {"current": 100.0, "previous": 90.0},
                    "system_cpu_usage": {"current": 50.0, "previous": 40.0},
                    "system_storage_usage": {"current": 10.0, "previous": 10.0},
                    "system_ram_usage": {"current": 20.0, "previous": 20.0},
                    "went_down_at": {"current": null, "previous": null}
                },
                "meta_data": {
                    "system_id": "sys-1",
                    "system_parent_id": "parent-1",
                    "system_name": "Node One",
                    "last_monitored": 1700000000.0
                }
            }
        });
        let body_bytes = serde_json::to_vec(&body).unwrap();
        match decode_envelope(&body_bytes).unwrap() {
            IncomingEnvelope::Result(payload) => {
                assert_eq!(payload.meta_data.system_id, "sys-1");
                assert_eq!(payload.data.system_cpu_usage.current, Some(50.0));
            }
            IncomingEnvelope::Error(_) => panic!("expected a result envelope"),
        }
    }

    #[test]
    fn rejects_unknown_shape() {
        let body = serde_json::to_vec(&serde_json::json!({"unexpected": true})).unwrap();
        let err = decode_envelope(&body).unwrap_err();
        assert!(matches!(err, AlerterError::UnexpectedData(_)));
    }

    #[test]
    fn rejects_malformed_result() {
        let body = serde_json::to_vec(&serde_json::json!({"result": {"data": {}}})).unwrap();
        let err = decode_envelope(&body).unwrap_err();
        assert!(matches!(err, AlerterError::Malformed(_)));
    }

    #[test]
    fn routing_key_matching() {
        assert!(routing_key_contains_parent("alerter.system.parent-1", "parent-1"));
        assert!(!routing_key_contains_parent("alerter.system.parent-2", "parent-1"));
    }
}
