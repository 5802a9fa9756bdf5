use serde::{Deserialize, Serialize};

/// Represents a published message in the bus.
///
/// A message consists of the topic it was published under, the opaque
/// payload, and a timestamp set by the broker at publish time.
///
/// Messages are immutable once built. The broker shares a single instance
/// between every subscriber of a publish call as `Arc<Message<T>>`, so the
/// payload type does not need to be `Clone`.
///
/// # Fields
///
/// - `topic` - The name of the topic this message belongs to.
/// - `payload` - The message content supplied by the publisher.
/// - `published_at` - Milliseconds since the Unix epoch when the message was created.
///
/// # Example
///
/// ```rust
/// use popbus::Message;
///
/// let msg = Message::new("sensor_updates", 25_u32);
/// assert_eq!(msg.topic(), "sensor_updates");
/// assert_eq!(*msg.payload(), 25);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<T> {
    topic: String,
    payload: T,
    published_at: i64,
}

impl<T> Message<T> {
    /// Build a message stamped with the current time.
    pub fn new(topic: impl Into<String>, payload: T) -> Self {
        Self {
            topic: topic.into(),
            payload,
            published_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Unix timestamp in milliseconds.
    pub fn published_at(&self) -> i64 {
        self.published_at
    }

    /// Consume the message, returning its payload.
    pub fn into_payload(self) -> T {
        self.payload
    }
}
