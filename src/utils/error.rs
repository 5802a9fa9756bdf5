//! The `error` module defines the error types used within `popbus`.
//!
//! Only registry-level failures and the end-of-life signal of an inbox are
//! errors. Delivery-level conditions (inactive subscriber, full inbox) are
//! absorbed by the dispatch engine and reported through counters instead.

use thiserror::Error;

use crate::subscriber::SubscriberId;

#[derive(Error, Debug)]
pub enum Error {
    /// The secure random source could not produce a subscriber identifier.
    #[error("failed to generate subscriber identity: {0}")]
    IdentityGeneration(#[source] rand::Error),

    /// The subscriber was deactivated and its inbox has been drained.
    #[error("subscriber channel closed")]
    ChannelClosed,

    /// The subscriber handle is not registered with this broker.
    #[error("subscriber {0} is not registered with this broker")]
    UnknownSubscriber(SubscriberId),
}

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, Error>;
