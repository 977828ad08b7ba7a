use super::*;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

const FULL_TOML: &str = r#"
    [broker]
    host = "broker.hivemq.com"
    port = 8000
    transport = "ws"

    [kitchen]
    order_topic = "osensa/orders"
"#;

const KITCHEN_VARS: [&str; 7] = [
    "KITCHEN_BROKER__HOST",
    "KITCHEN_BROKER__PORT",
    "KITCHEN_BROKER__TRANSPORT",
    "KITCHEN_BROKER__CLIENT_ID",
    "KITCHEN_KITCHEN__ORDER_TOPIC",
    "KITCHEN_KITCHEN__COOK_TIME_MIN_SECS",
    "KITCHEN_KITCHEN__COOK_TIME_MAX_SECS",
];

fn write_config(dir: &TempDir, contents: &str) -> String {
    let path = dir.path().join("kitchen.toml");
    fs::write(&path, contents).expect("write config file");
    path.to_str().expect("utf-8 path").to_string()
}

/// Runs `f` with every kitchen variable unset, then the given ones applied.
fn with_kitchen_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
    let mut all: Vec<(&str, Option<&str>)> = KITCHEN_VARS.iter().map(|k| (*k, None)).collect();
    for (key, value) in vars {
        all.retain(|(k, _)| k != key);
        all.push((*key, Some(*value)));
    }
    temp_env::with_vars(all, f)
}

#[test]
#[serial]
fn file_values_fill_required_and_defaults_fill_the_rest() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(&tmp, FULL_TOML);

    let cfg = with_kitchen_env(&[], || load_config_from(&path)).expect("load_config failed");
    assert_eq!(cfg.broker.host, "broker.hivemq.com");
    assert_eq!(cfg.broker.port, 8000);
    assert_eq!(cfg.broker.transport, TransportMode::Ws);
    assert_eq!(cfg.broker.ws_path, "/mqtt");
    assert!(cfg.broker.client_id.is_none());
    assert_eq!(cfg.broker.keep_alive_secs, 30);
    assert_eq!(cfg.kitchen.order_topic, "osensa/orders");
    assert_eq!(cfg.kitchen.cook_time_min_secs, 5.0);
    assert_eq!(cfg.kitchen.cook_time_max_secs, 15.0);
}

#[test]
#[serial]
fn environment_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(&tmp, FULL_TOML);

    let cfg = with_kitchen_env(
        &[
            ("KITCHEN_BROKER__HOST", "localhost"),
            ("KITCHEN_BROKER__PORT", "1883"),
            ("KITCHEN_BROKER__TRANSPORT", "tcp"),
            ("KITCHEN_KITCHEN__COOK_TIME_MAX_SECS", "7.5"),
        ],
        || load_config_from(&path),
    )
    .expect("load_config failed");

    assert_eq!(cfg.broker.host, "localhost");
    assert_eq!(cfg.broker.port, 1883);
    assert_eq!(cfg.broker.transport, TransportMode::Tcp);
    assert_eq!(cfg.kitchen.order_topic, "osensa/orders");
    assert_eq!(cfg.kitchen.cook_time_max_secs, 7.5);
}

#[test]
#[serial]
fn environment_alone_is_enough() {
    let cfg = with_kitchen_env(
        &[
            ("KITCHEN_BROKER__HOST", "broker.local"),
            ("KITCHEN_BROKER__PORT", "8884"),
            ("KITCHEN_BROKER__TRANSPORT", "wss"),
            ("KITCHEN_KITCHEN__ORDER_TOPIC", "orders"),
        ],
        || load_config_from("does/not/exist"),
    )
    .expect("load_config failed");

    assert_eq!(cfg.broker.endpoint(), "wss://broker.local:8884/mqtt");
    assert_eq!(cfg.kitchen.order_topic, "orders");
}

#[test]
#[serial]
fn missing_required_key_is_named() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [broker]
            host = "localhost"
            transport = "tcp"

            [kitchen]
            order_topic = "orders"
        "#,
    );

    let err = with_kitchen_env(&[], || load_config_from(&path)).unwrap_err();
    assert!(matches!(err, KitchenError::MissingSetting("broker.port")));
}

#[test]
#[serial]
fn missing_kitchen_section_is_fatal() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [broker]
            host = "localhost"
            port = 1883
            transport = "tcp"
        "#,
    );

    let err = with_kitchen_env(&[], || load_config_from(&path)).unwrap_err();
    assert!(matches!(err, KitchenError::MissingSetting("kitchen.order_topic")));
}

#[test]
#[serial]
fn inverted_cook_bounds_are_rejected() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(&tmp, FULL_TOML);

    let err = with_kitchen_env(
        &[
            ("KITCHEN_KITCHEN__COOK_TIME_MIN_SECS", "10"),
            ("KITCHEN_KITCHEN__COOK_TIME_MAX_SECS", "2"),
        ],
        || load_config_from(&path),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        KitchenError::InvalidSetting {
            key: "kitchen.cook_time_max_secs",
            ..
        }
    ));
}

#[test]
#[serial]
fn cook_bounds_beyond_duration_range_are_rejected() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(&tmp, FULL_TOML);

    let err = with_kitchen_env(&[("KITCHEN_KITCHEN__COOK_TIME_MAX_SECS", "1e20")], || {
        load_config_from(&path)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        KitchenError::InvalidSetting {
            key: "kitchen.cook_time_max_secs",
            ..
        }
    ));

    let err = with_kitchen_env(
        &[
            ("KITCHEN_KITCHEN__COOK_TIME_MIN_SECS", "1e20"),
            ("KITCHEN_KITCHEN__COOK_TIME_MAX_SECS", "1e20"),
        ],
        || load_config_from(&path),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        KitchenError::InvalidSetting {
            key: "kitchen.cook_time_min_secs",
            ..
        }
    ));
}

#[test]
#[serial]
fn wildcard_intake_topic_is_rejected() {
    let err = with_kitchen_env(
        &[
            ("KITCHEN_BROKER__HOST", "localhost"),
            ("KITCHEN_BROKER__PORT", "1883"),
            ("KITCHEN_BROKER__TRANSPORT", "tcp"),
            ("KITCHEN_KITCHEN__ORDER_TOPIC", "orders/#"),
        ],
        || load_config_from("does/not/exist"),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        KitchenError::InvalidSetting {
            key: "kitchen.order_topic",
            ..
        }
    ));
}

#[test]
#[serial]
fn load_config_reads_default_path_from_current_dir() {
    // Create a temporary directory and set it as current dir so load_config
    // will pick up config/kitchen.toml from there.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    fs::write("config/kitchen.toml", FULL_TOML).expect("write config file");

    let cfg = with_kitchen_env(&[], load_config);

    // restore cwd before asserting so a failure does not leak the tempdir
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.broker.host, "broker.hivemq.com");
    assert_eq!(cfg.broker.endpoint(), "ws://broker.hivemq.com:8000/mqtt");
}

#[test]
fn endpoint_formats_per_transport() {
    let tcp = BrokerSettings::new("localhost", 1883, TransportMode::Tcp);
    assert_eq!(tcp.endpoint(), "mqtt://localhost:1883");

    let tls = BrokerSettings::new("localhost", 8883, TransportMode::Tls);
    assert_eq!(tls.endpoint(), "mqtts://localhost:8883");

    let mut ws = BrokerSettings::new("localhost", 8000, TransportMode::Ws);
    ws.ws_path = "/ws".to_string();
    assert_eq!(ws.endpoint(), "ws://localhost:8000/ws");
}
