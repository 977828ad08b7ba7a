use serde::Deserialize;

pub const DEFAULT_WS_PATH: &str = "/mqtt";
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_COOK_TIME_MIN_SECS: f64 = 5.0;
pub const DEFAULT_COOK_TIME_MAX_SECS: f64 = 15.0;

/// Top-level configuration settings for the application.
///
/// Includes settings for both the broker connection and the kitchen itself.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub kitchen: KitchenSettings,
}

/// How the MQTT session reaches the broker.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl TransportMode {
    pub fn is_websocket(self) -> bool {
        matches!(self, TransportMode::Ws | TransportMode::Wss)
    }
}

/// Configuration settings for the broker session.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub transport: TransportMode,
    pub ws_path: String,
    /// Generated per process when absent.
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    /// Capacity of the client's outgoing request channel.
    pub channel_capacity: usize,
}

impl BrokerSettings {
    /// Settings for `host:port` with every optional value at its default.
    pub fn new(host: impl Into<String>, port: u16, transport: TransportMode) -> Self {
        Self {
            host: host.into(),
            port,
            transport,
            ws_path: DEFAULT_WS_PATH.to_string(),
            client_id: None,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Human readable broker address, used in logs and errors.
    pub fn endpoint(&self) -> String {
        match self.transport {
            TransportMode::Tcp => format!("mqtt://{}:{}", self.host, self.port),
            TransportMode::Tls => format!("mqtts://{}:{}", self.host, self.port),
            TransportMode::Ws => format!("ws://{}:{}{}", self.host, self.port, self.ws_path),
            TransportMode::Wss => format!("wss://{}:{}{}", self.host, self.port, self.ws_path),
        }
    }
}

/// Configuration settings for order intake and cooking.
#[derive(Debug, Deserialize, Clone)]
pub struct KitchenSettings {
    pub order_topic: String,
    pub cook_time_min_secs: f64,
    pub cook_time_max_secs: f64,
}

impl KitchenSettings {
    pub fn new(order_topic: impl Into<String>) -> Self {
        Self {
            order_topic: order_topic.into(),
            cook_time_min_secs: DEFAULT_COOK_TIME_MIN_SECS,
            cook_time_max_secs: DEFAULT_COOK_TIME_MAX_SECS,
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Every value is optional here; `load_config` decides which ones are
/// required and fills the rest from defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub kitchen: Option<PartialKitchenSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub transport: Option<TransportMode>,
    pub ws_path: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialKitchenSettings {
    pub order_topic: Option<String>,
    pub cook_time_min_secs: Option<f64>,
    pub cook_time_max_secs: Option<f64>,
}
