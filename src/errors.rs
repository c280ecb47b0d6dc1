//! Error types for the alerting core.
//!
//! The boundary-facing error enum mirrors the error kinds named in the
//! design: transport faults bubble up and can terminate the process,
//! everything else is caught, logged, and turned into either an alert
//! or a dropped/acked message.

use thiserror::Error;

/// Errors that can occur while the alerter or manager are running.
#[derive(Debug, Error)]
pub enum AlerterError {
    /// Connection or channel failure talking to the message bus.
    #[error("message bus transport failure: {0}")]
    Transport(String),

    /// A publisher confirm reported the message as unroutable.
    #[error("message was not delivered: exchange={exchange} routing_key={routing_key}")]
    NotDelivered {
        exchange: String,
        routing_key: String,
    },

    /// The delivery body did not match any known envelope shape, or was
    /// missing a key the matched shape requires.
    #[error("received unexpected data: {0}")]
    UnexpectedData(String),

    /// `serde_json` failed to parse the delivery body.
    #[error("malformed delivery body: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type AlerterResult<T> = Result<T, AlerterError>;
