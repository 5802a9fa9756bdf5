use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::broker::message::Message;
use crate::subscriber::inbox::{self, Envelope, InboxPolicy, InboxReceiver, InboxSender};
use crate::utils::error::{Error, Result};

pub type SubscriberId = String;

/// Generate a subscriber id from 16 bytes of `rng`, formatted as a v4 UUID.
pub fn generate_id<R: RngCore + CryptoRng>(rng: &mut R) -> Result<SubscriberId> {
    let mut bytes = [0u8; 16];
    rng.try_fill_bytes(&mut bytes)
        .map_err(Error::IdentityGeneration)?;
    Ok(uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string())
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The subscriber was deactivated before the write.
    DroppedInactive,
    /// `DropNewest` inbox was full.
    DroppedFull,
    /// `Block` inbox stayed full for the whole timeout.
    TimedOut,
}

/// Point-in-time copy of a subscriber's delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub delivered: u64,
    pub dropped_inactive: u64,
    pub dropped_full: u64,
    pub timed_out: u64,
}

impl SubscriberStats {
    /// Every attempt that did not reach the inbox.
    pub fn dropped(&self) -> u64 {
        self.dropped_inactive + self.dropped_full + self.timed_out
    }
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    dropped_inactive: AtomicU64,
    dropped_full: AtomicU64,
    timed_out: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Delivered => &self.delivered,
            DeliveryOutcome::DroppedInactive => &self.dropped_inactive,
            DeliveryOutcome::DroppedFull => &self.dropped_full,
            DeliveryOutcome::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SubscriberStats {
        SubscriberStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_inactive: self.dropped_inactive.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

struct State<T> {
    topics: HashSet<String>,
    active: bool,
    /// `None` once deactivated; dropping it is what closes the inbox.
    sender: Option<InboxSender<T>>,
}

/// An addressable mailbox in the bus.
///
/// A subscriber is created by the [`Broker`](crate::Broker), which keeps it
/// in its registry and tracks its topics. Consumers read their feed through
/// [`receive`](Self::receive) until it reports [`Error::ChannelClosed`].
///
/// The topic set and the active flag live behind the subscriber's own lock,
/// independent of the broker's registry lock, so inspecting a subscriber
/// never contends with other subscribers or with publishers.
pub struct Subscriber<T> {
    id: SubscriberId,
    policy: InboxPolicy,
    state: Mutex<State<T>>,
    inbox: tokio::sync::Mutex<InboxReceiver<T>>,
    closed: watch::Sender<bool>,
    counters: Counters,
}

impl<T> Subscriber<T> {
    /// Create an active subscriber with a fresh id from the OS random source.
    pub fn create(policy: InboxPolicy) -> Result<Self> {
        let id = generate_id(&mut OsRng)?;
        Ok(Self::with_id(id, policy))
    }

    pub(crate) fn with_id(id: SubscriberId, policy: InboxPolicy) -> Self {
        let (sender, receiver) = inbox::channel(policy);
        let (closed, _) = watch::channel(false);
        Self {
            id,
            policy,
            state: Mutex::new(State {
                topics: HashSet::new(),
                active: true,
                sender: Some(sender),
            }),
            inbox: tokio::sync::Mutex::new(receiver),
            closed,
            counters: Counters::default(),
        }
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn policy(&self) -> InboxPolicy {
        self.policy
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Record `topic` in the subscriber's topic set. Returns `false` if it was already there.
    pub(crate) fn add_topic(&self, topic: &str) -> bool {
        self.state.lock().topics.insert(topic.to_string())
    }

    /// Drop `topic` from the topic set. Returns `false` if it was absent.
    pub(crate) fn remove_topic(&self, topic: &str) -> bool {
        self.state.lock().topics.remove(topic)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.state.lock().topics.contains(topic)
    }

    /// Sorted copy of the subscribed topic names.
    pub fn list_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state.lock().topics.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Mark the subscriber inactive and close its inbox.
    ///
    /// Returns `true` on the active → inactive transition and `false` when
    /// the subscriber was already inactive. There is no way back.
    pub fn deactivate(&self) -> bool {
        {
            let mut state = self.state.lock();
            if !state.active {
                return false;
            }
            state.active = false;
            state.sender = None;
        }
        // wakes deliveries parked on a full `Block` inbox
        self.closed.send_replace(true);
        debug!("Subscriber {} deactivated", self.id);
        true
    }

    /// Best-effort number of messages waiting in the inbox.
    ///
    /// Reports 0 while another task holds the inbox inside
    /// [`receive`](Self::receive).
    pub fn pending(&self) -> usize {
        self.inbox.try_lock().map(|inbox| inbox.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> SubscriberStats {
        self.counters.snapshot()
    }

    /// Wait for the next message.
    ///
    /// Fails with [`Error::ChannelClosed`] once the subscriber has been
    /// deactivated and everything already queued has been read.
    pub async fn receive(&self) -> Result<Arc<Message<T>>> {
        let mut inbox = self.inbox.lock().await;
        inbox.recv().await.ok_or(Error::ChannelClosed)
    }

    /// Non-blocking read. `Ok(None)` when the inbox is empty or another
    /// task is currently inside [`receive`](Self::receive).
    pub fn try_receive(&self) -> Result<Option<Arc<Message<T>>>> {
        let Ok(mut inbox) = self.inbox.try_lock() else {
            return Ok(None);
        };
        match inbox.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    fn sender(&self) -> Option<InboxSender<T>> {
        let state = self.state.lock();
        if state.active {
            state.sender.clone()
        } else {
            None
        }
    }

    /// Non-blocking write, performed under the state lock so it can never
    /// land after `deactivate` returned.
    fn deliver_now(&self, message: Envelope<T>) -> DeliveryOutcome {
        let state = self.state.lock();
        if !state.active {
            return DeliveryOutcome::DroppedInactive;
        }
        match &state.sender {
            None => DeliveryOutcome::DroppedInactive,
            Some(InboxSender::Unbounded(tx)) => match tx.send(message) {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(_) => DeliveryOutcome::DroppedInactive,
            },
            Some(InboxSender::Bounded(tx)) => match tx.try_send(message) {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(TrySendError::Full(_)) => {
                    warn!("Inbox of {} is full, dropping message", self.id);
                    DeliveryOutcome::DroppedFull
                }
                Err(TrySendError::Closed(_)) => DeliveryOutcome::DroppedInactive,
            },
        }
    }

    async fn deliver_blocking(
        &self,
        message: Envelope<T>,
        timeout: std::time::Duration,
    ) -> DeliveryOutcome {
        let Some(InboxSender::Bounded(tx)) = self.sender() else {
            return self.deliver_now(message);
        };
        let mut closed = self.closed.subscribe();

        let permit = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => return DeliveryOutcome::DroppedInactive,
            reserved = tokio::time::timeout(timeout, tx.reserve()) => match reserved {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return DeliveryOutcome::DroppedInactive,
                Err(_) => {
                    warn!(
                        "Inbox of {} stayed full for {:?}, dropping message",
                        self.id, timeout
                    );
                    return DeliveryOutcome::TimedOut;
                }
            },
        };

        let state = self.state.lock();
        if !state.active {
            return DeliveryOutcome::DroppedInactive;
        }
        permit.send(message);
        DeliveryOutcome::Delivered
    }

    /// Attempt to place `message` in the inbox according to the policy.
    ///
    /// Never fails: an inactive subscriber or a full inbox is an expected
    /// race and is reported through the returned outcome and the counters.
    pub async fn deliver(&self, message: Arc<Message<T>>) -> DeliveryOutcome {
        let outcome = match self.policy {
            InboxPolicy::Block { timeout, .. } => self.deliver_blocking(message, timeout).await,
            InboxPolicy::Unbounded | InboxPolicy::DropNewest { .. } => self.deliver_now(message),
        };
        trace!("Delivery to {}: {:?}", self.id, outcome);
        self.counters.record(outcome);
        outcome
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("active", &state.active)
            .field("topics", &state.topics)
            .finish()
    }
}
