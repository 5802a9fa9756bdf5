//! Subscriber inboxes
//!
//! An inbox is the receive side of a subscriber: a tokio mpsc channel whose
//! flavour follows the subscriber's [`InboxPolicy`].
//!
//! Overflow behaviour per policy:
//! - `Unbounded`: writes never wait and never fail while the subscriber is
//!   active. Memory grows with a slow consumer.
//! - `DropNewest`: bounded. A write into a full inbox is discarded at once
//!   and counted as `DroppedFull`; messages already queued are kept.
//! - `Block`: bounded. A write into a full inbox waits for free capacity for
//!   at most `timeout`, then is discarded and counted as `TimedOut`.
//!   Deactivating the subscriber ends the wait immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::broker::message::Message;

/// Capacity used when a bounded policy is configured with zero.
const MIN_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxPolicy {
    Unbounded,
    DropNewest { capacity: usize },
    Block { capacity: usize, timeout: Duration },
}

impl InboxPolicy {
    pub const DEFAULT_CAPACITY: usize = 64;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

    /// Queue capacity, `None` for unbounded inboxes.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            InboxPolicy::Unbounded => None,
            InboxPolicy::DropNewest { capacity } | InboxPolicy::Block { capacity, .. } => {
                Some((*capacity).max(MIN_CAPACITY))
            }
        }
    }
}

impl Default for InboxPolicy {
    fn default() -> Self {
        InboxPolicy::Block {
            capacity: Self::DEFAULT_CAPACITY,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

pub(crate) type Envelope<T> = Arc<Message<T>>;

pub(crate) enum InboxSender<T> {
    Unbounded(mpsc::UnboundedSender<Envelope<T>>),
    Bounded(mpsc::Sender<Envelope<T>>),
}

// derive(Clone) would demand `T: Clone`
impl<T> Clone for InboxSender<T> {
    fn clone(&self) -> Self {
        match self {
            InboxSender::Unbounded(tx) => InboxSender::Unbounded(tx.clone()),
            InboxSender::Bounded(tx) => InboxSender::Bounded(tx.clone()),
        }
    }
}

pub(crate) enum InboxReceiver<T> {
    Unbounded(mpsc::UnboundedReceiver<Envelope<T>>),
    Bounded(mpsc::Receiver<Envelope<T>>),
}

impl<T> InboxReceiver<T> {
    /// Wait for the next message. `None` once every sender is gone and the
    /// queue is drained.
    pub(crate) async fn recv(&mut self) -> Option<Envelope<T>> {
        match self {
            InboxReceiver::Unbounded(rx) => rx.recv().await,
            InboxReceiver::Bounded(rx) => rx.recv().await,
        }
    }

    pub(crate) fn try_recv(&mut self) -> Result<Envelope<T>, TryRecvError> {
        match self {
            InboxReceiver::Unbounded(rx) => rx.try_recv(),
            InboxReceiver::Bounded(rx) => rx.try_recv(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            InboxReceiver::Unbounded(rx) => rx.len(),
            InboxReceiver::Bounded(rx) => rx.len(),
        }
    }
}

/// Allocate a fresh inbox for `policy`.
pub(crate) fn channel<T>(policy: InboxPolicy) -> (InboxSender<T>, InboxReceiver<T>) {
    match policy.capacity() {
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (InboxSender::Unbounded(tx), InboxReceiver::Unbounded(rx))
        }
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity);
            (InboxSender::Bounded(tx), InboxReceiver::Bounded(rx))
        }
    }
}
