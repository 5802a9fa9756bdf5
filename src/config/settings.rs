use std::time::Duration;

use serde::Deserialize;

use crate::broker::dispatch::{DispatchMode, SpawnDispatcher};
use crate::subscriber::InboxPolicy;

/// Top-level configuration settings for the bus.
///
/// Groups the broker's dispatch strategy, the default inbox of new
/// subscribers and the logging level.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub inbox: InboxSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the broker's dispatch engine.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub dispatch: DispatchMode,
    /// Cap on concurrently running delivery tasks (spawned dispatch only).
    pub max_in_flight: usize,
}

/// What a bounded inbox does when it is full.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Overflow {
    Unbounded,
    Drop,
    Block,
}

/// Default inbox for subscribers created without an explicit policy.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct InboxSettings {
    pub overflow: Overflow,
    pub capacity: usize,
    pub send_timeout_ms: u64,
}

impl InboxSettings {
    pub fn policy(&self) -> InboxPolicy {
        match self.overflow {
            Overflow::Unbounded => InboxPolicy::Unbounded,
            Overflow::Drop => InboxPolicy::DropNewest {
                capacity: self.capacity,
            },
            Overflow::Block => InboxPolicy::Block {
                capacity: self.capacity,
                timeout: Duration::from_millis(self.send_timeout_ms),
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub inbox: Option<PartialInboxSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub dispatch: Option<DispatchMode>,
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialInboxSettings {
    pub overflow: Option<Overflow>,
    pub capacity: Option<usize>,
    pub send_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                dispatch: DispatchMode::Spawned,
                max_in_flight: SpawnDispatcher::DEFAULT_MAX_IN_FLIGHT,
            },
            inbox: InboxSettings {
                overflow: Overflow::Block,
                capacity: InboxPolicy::DEFAULT_CAPACITY,
                send_timeout_ms: InboxPolicy::DEFAULT_TIMEOUT.as_millis() as u64,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
