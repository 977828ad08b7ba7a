//! The `error` module defines the error types used within the `kitchen`
//! application.
//!
//! Only [`ConnectionError`] is fatal to the order loop. [`OrderError`] is
//! scoped to a single inbound message and [`PublishError`] to a single
//! cooking task; both are logged and dropped where they occur.

use std::time::Duration;

use thiserror::Error;

/// Failures of the broker session. Any of these ends the process.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("broker at {endpoint} is unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("broker at {endpoint} refused the connection: {code}")]
    Refused { endpoint: String, code: String },

    #[error("no answer from broker at {endpoint} within {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("subscription to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("connection to broker lost: {0}")]
    Lost(String),

    #[error("connection to broker closed")]
    Closed,
}

/// Why an inbound payload was not promoted to an order.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The payload is not valid UTF-8 JSON.
    #[error("malformed order payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// Well-formed JSON with missing or mistyped fields.
    #[error("invalid order: {0}")]
    Validation(String),
}

/// A single publish attempt failed. Never retried.
#[derive(Debug, Error)]
#[error("publish to '{topic}' failed: {reason}")]
pub struct PublishError {
    pub topic: String,
    pub reason: String,
}

impl PublishError {
    pub fn new(topic: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }
}

/// Startup failures surfaced by the CLI.
#[derive(Debug, Error)]
pub enum KitchenError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("missing required setting '{0}'")]
    MissingSetting(&'static str),

    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
