mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, InboxSettings, LoggingSettings, Overflow, Settings};

/// Prefix of the environment variables read by [`load_config`],
/// e.g. `POPBUS_INBOX__CAPACITY=128`.
pub const ENV_PREFIX: &str = "POPBUS";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the broker, inbox and logging configuration
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    Settings {
        broker: BrokerSettings {
            dispatch: partial
                .broker
                .as_ref()
                .and_then(|b| b.dispatch)
                .unwrap_or(default.broker.dispatch),
            max_in_flight: partial
                .broker
                .as_ref()
                .and_then(|b| b.max_in_flight)
                .unwrap_or(default.broker.max_in_flight),
        },
        inbox: InboxSettings {
            overflow: partial
                .inbox
                .as_ref()
                .and_then(|i| i.overflow)
                .unwrap_or(default.inbox.overflow),
            capacity: partial
                .inbox
                .as_ref()
                .and_then(|i| i.capacity)
                .unwrap_or(default.inbox.capacity),
            send_timeout_ms: partial
                .inbox
                .as_ref()
                .and_then(|i| i.send_timeout_ms)
                .unwrap_or(default.inbox.send_timeout_ms),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .and_then(|l| l.level)
                .unwrap_or(default.logging.level),
        },
    }
}

#[cfg(test)]
mod tests;
