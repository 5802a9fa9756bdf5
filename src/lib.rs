//! # PopBus
//!
//! `popbus` is an in-process publish/subscribe bus. Producers publish typed
//! messages under a topic name; consumers register interest in topics and
//! read a private feed of the messages addressed to them.
//!
//! ## Core Modules
//!
//! - `broker`: the subscriber registry, the topic index and the dispatch engine.
//! - `subscriber`: a consumer's mailbox, its topic set and its inbox policy.
//! - `config`: loading settings from defaults, a config file and the environment.
//! - `utils`: shared error type and logging setup.
//!
//! ## Example
//!
//! ```rust,no_run
//! # async fn demo() -> popbus::Result<()> {
//! let broker = popbus::Broker::<String>::default();
//! let subscriber = broker.add_subscriber()?;
//! broker.subscribe(&subscriber, "news")?;
//!
//! broker.publish("news", "hello".to_string()).await;
//! let message = subscriber.receive().await?;
//! assert_eq!(message.payload(), "hello");
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod subscriber;
pub mod utils;

pub use broker::{Broker, BrokerStats, DeliveryReport, DispatchMode, Dispatched, Dispatcher, Message};
pub use subscriber::{DeliveryOutcome, InboxPolicy, Subscriber, SubscriberId, SubscriberStats};
pub use utils::error::{Error, Result};

#[cfg(test)]
mod tests;
