mod settings;

use std::time::Duration;

use crate::utils::error::KitchenError;
use config::{Config, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, DEFAULT_COOK_TIME_MAX_SECS, DEFAULT_COOK_TIME_MIN_SECS, KitchenSettings,
    Settings, TransportMode,
};

/// Config file looked up when no path is given (any extension `config`
/// understands, e.g. `config/kitchen.toml`).
pub const DEFAULT_CONFIG_PATH: &str = "config/kitchen";

/// Prefix for environment overrides, e.g. `KITCHEN_BROKER__HOST`.
pub const ENV_PREFIX: &str = "KITCHEN";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, KitchenError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads the configuration from `path` (optional) layered under environment
/// variables, then checks required keys and fills defaults.
pub fn load_config_from(path: &str) -> Result<Settings, KitchenError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = merge(partial)?;
    validate(&settings)?;
    Ok(settings)
}

fn merge(partial: PartialSettings) -> Result<Settings, KitchenError> {
    let broker = partial
        .broker
        .ok_or(KitchenError::MissingSetting("broker.host"))?;
    let kitchen = partial
        .kitchen
        .ok_or(KitchenError::MissingSetting("kitchen.order_topic"))?;

    let mut broker_settings = BrokerSettings::new(
        broker
            .host
            .ok_or(KitchenError::MissingSetting("broker.host"))?,
        broker
            .port
            .ok_or(KitchenError::MissingSetting("broker.port"))?,
        broker
            .transport
            .ok_or(KitchenError::MissingSetting("broker.transport"))?,
    );
    if let Some(ws_path) = broker.ws_path {
        broker_settings.ws_path = ws_path;
    }
    broker_settings.client_id = broker.client_id;
    if let Some(secs) = broker.keep_alive_secs {
        broker_settings.keep_alive_secs = secs;
    }
    if let Some(secs) = broker.connect_timeout_secs {
        broker_settings.connect_timeout_secs = secs;
    }
    if let Some(capacity) = broker.channel_capacity {
        broker_settings.channel_capacity = capacity;
    }

    let mut kitchen_settings = KitchenSettings::new(
        kitchen
            .order_topic
            .ok_or(KitchenError::MissingSetting("kitchen.order_topic"))?,
    );
    if let Some(min) = kitchen.cook_time_min_secs {
        kitchen_settings.cook_time_min_secs = min;
    }
    if let Some(max) = kitchen.cook_time_max_secs {
        kitchen_settings.cook_time_max_secs = max;
    }

    Ok(Settings {
        broker: broker_settings,
        kitchen: kitchen_settings,
    })
}

fn validate(settings: &Settings) -> Result<(), KitchenError> {
    let broker = &settings.broker;
    if broker.host.trim().is_empty() {
        return Err(KitchenError::MissingSetting("broker.host"));
    }
    if broker.transport.is_websocket() && !broker.ws_path.starts_with('/') {
        return Err(KitchenError::InvalidSetting {
            key: "broker.ws_path",
            reason: format!("'{}' must start with '/'", broker.ws_path),
        });
    }
    if let Some(id) = &broker.client_id {
        if id.is_empty() || id.starts_with(' ') {
            return Err(KitchenError::InvalidSetting {
                key: "broker.client_id",
                reason: format!("'{id}' is not a usable client id"),
            });
        }
    }
    if broker.channel_capacity == 0 {
        return Err(KitchenError::InvalidSetting {
            key: "broker.channel_capacity",
            reason: "must be at least 1".to_string(),
        });
    }

    let kitchen = &settings.kitchen;
    if kitchen.order_topic.is_empty() {
        return Err(KitchenError::MissingSetting("kitchen.order_topic"));
    }
    if kitchen.order_topic.contains(['+', '#']) {
        return Err(KitchenError::InvalidSetting {
            key: "kitchen.order_topic",
            reason: "wildcards are not allowed in the intake topic".to_string(),
        });
    }

    let (min, max) = (kitchen.cook_time_min_secs, kitchen.cook_time_max_secs);
    if let Err(e) = Duration::try_from_secs_f64(min) {
        return Err(KitchenError::InvalidSetting {
            key: "kitchen.cook_time_min_secs",
            reason: format!("{min} is not a usable number of seconds: {e}"),
        });
    }
    if let Err(e) = Duration::try_from_secs_f64(max) {
        return Err(KitchenError::InvalidSetting {
            key: "kitchen.cook_time_max_secs",
            reason: format!("{max} is not a usable number of seconds: {e}"),
        });
    }
    if max < min {
        return Err(KitchenError::InvalidSetting {
            key: "kitchen.cook_time_max_secs",
            reason: format!("{max} must be a number of seconds no smaller than {min}"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests;
