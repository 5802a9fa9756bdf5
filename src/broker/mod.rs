pub mod dispatch;
pub mod engine;
pub mod message;
pub mod topic;

pub use dispatch::{DeliveryReport, DispatchMode, Dispatched, Dispatcher, InlineDispatcher, SpawnDispatcher};
pub use engine::{Broker, BrokerStats};
pub use message::Message;
