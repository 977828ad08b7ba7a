use super::error::{ConnectionError, KitchenError, OrderError, PublishError};
use super::logging;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warning");
    logging::init("nonsense");
}

#[test]
fn publish_error_names_topic() {
    let err = PublishError::new("table/3/food", "event loop stopped");
    assert_eq!(
        err.to_string(),
        "publish to 'table/3/food' failed: event loop stopped"
    );
}

#[test]
fn decode_error_keeps_source() {
    let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err = OrderError::Decode(source);
    assert!(err.to_string().starts_with("malformed order payload"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn connection_error_is_transparent_in_kitchen_error() {
    let err: KitchenError = ConnectionError::Lost("reset by peer".to_string()).into();
    assert_eq!(err.to_string(), "connection to broker lost: reset by peer");
}

#[test]
fn missing_setting_names_key() {
    let err = KitchenError::MissingSetting("broker.host");
    assert_eq!(err.to_string(), "missing required setting 'broker.host'");
}
