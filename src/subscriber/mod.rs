//! The `subscriber` module defines the consumer side of the bus.
//!
//! It provides the `Subscriber` type, which encapsulates the state of a
//! single consumer: its unique identifier, the topics it is registered for,
//! its active flag and the inbox the broker delivers into.

mod handle;
pub mod inbox;

pub use handle::{DeliveryOutcome, Subscriber, SubscriberId, SubscriberStats, generate_id};
pub use inbox::InboxPolicy;
