//! Broker engine
//!
//! This module contains the in-memory broker responsible for:
//! - creating subscribers and keeping the subscriber registry
//! - maintaining the topic index (topic name → subscriber ids)
//! - publishing messages by handing a snapshot of a topic's subscribers to
//!   the configured [`Dispatcher`]
//!
//! Concurrency and usage notes:
//! - Both maps live behind a single `RwLock`. Index reads (`subscriber_count`,
//!   `topics`, the publish snapshot) take the shared lock; every mutation
//!   (`add_subscriber`, `remove_subscriber`, `subscribe`, `unsubscribe`)
//!   takes the exclusive lock, and changes both sides of the index inside
//!   that one critical section.
//! - The lock is never held across an `.await`. Publish releases it before
//!   any delivery starts.
//! - Lock order is broker → subscriber. Subscribers never call back into the
//!   broker.
//! - A publish racing with `subscribe`/`unsubscribe` on the same topic may or
//!   may not include the subscriber that is changing. Either result is valid.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};

use crate::broker::dispatch::{Dispatched, Dispatcher, dispatcher_for};
use crate::broker::message::Message;
use crate::broker::topic::Topic;
use crate::config::Settings;
use crate::subscriber::{InboxPolicy, Subscriber, SubscriberId, generate_id};
use crate::utils::error::{Error, Result};

/// Point-in-time counters of a broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Registered subscribers.
    pub subscribers: usize,
    /// Topics with at least one subscriber.
    pub topics: usize,
    /// Calls to `publish`, including those that reached nobody.
    pub published: u64,
    /// Delivery attempts handed to the dispatcher.
    pub dispatched: u64,
}

struct Registry<T> {
    subscribers: HashMap<SubscriberId, Arc<Subscriber<T>>>,
    topics: HashMap<String, Topic>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
            topics: HashMap::new(),
        }
    }

    /// `true` only for the exact handle stored under its id.
    fn is_registered(&self, subscriber: &Subscriber<T>) -> bool {
        self.subscribers
            .get(subscriber.id())
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), subscriber))
    }

    /// Remove one (subscriber, topic) pair from both indices. Empty topic
    /// entries are dropped.
    fn unsubscribe(&mut self, subscriber: &Subscriber<T>, topic: &str) -> bool {
        let mut removed = false;
        if let Some(entry) = self.topics.get_mut(topic) {
            removed = entry.unsubscribe(subscriber.id());
            if entry.is_empty() {
                debug!("Topic {} has no subscribers left", entry.name());
                self.topics.remove(topic);
            }
        }
        subscriber.remove_topic(topic) || removed
    }

    fn snapshot(&self, topic: &str) -> Vec<Arc<Subscriber<T>>> {
        let Some(entry) = self.topics.get(topic) else {
            return Vec::new();
        };
        entry
            .ids()
            .filter_map(|id| self.subscribers.get(id).cloned())
            .collect()
    }
}

/// The registry and dispatch coordinator of the bus.
///
/// `Broker` is generic over the payload type. It is meant to be created once
/// and shared, typically as `Arc<Broker<T>>`; all methods take `&self`.
pub struct Broker<T: Send + Sync + 'static> {
    registry: RwLock<Registry<T>>,
    dispatcher: Arc<dyn Dispatcher<T>>,
    default_policy: InboxPolicy,
    published: AtomicU64,
    dispatched: AtomicU64,
}

impl<T: Send + Sync + 'static> Broker<T> {
    /// Attempts at finding an id that no live subscriber uses.
    const MAX_ID_ATTEMPTS: usize = 3;

    pub fn new(settings: &Settings) -> Self {
        Self::with_dispatcher(
            dispatcher_for(settings.broker.dispatch, settings.broker.max_in_flight),
            settings.inbox.policy(),
        )
    }

    pub fn with_dispatcher(dispatcher: Arc<dyn Dispatcher<T>>, default_policy: InboxPolicy) -> Self {
        Self {
            registry: RwLock::new(Registry::new()),
            dispatcher,
            default_policy,
            published: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn default_policy(&self) -> InboxPolicy {
        self.default_policy
    }

    /// Create a subscriber with the broker's default inbox and register it.
    pub fn add_subscriber(&self) -> Result<Arc<Subscriber<T>>> {
        self.add_subscriber_with(self.default_policy)
    }

    /// Create a subscriber with its own inbox policy and register it.
    pub fn add_subscriber_with(&self, policy: InboxPolicy) -> Result<Arc<Subscriber<T>>> {
        self.add_subscriber_from(policy, &mut OsRng)
    }

    /// Register a subscriber whose id is drawn from `rng`. An id that is
    /// already live is redrawn, up to `MAX_ID_ATTEMPTS` times.
    pub(crate) fn add_subscriber_from<R: RngCore + CryptoRng>(
        &self,
        policy: InboxPolicy,
        rng: &mut R,
    ) -> Result<Arc<Subscriber<T>>> {
        let mut registry = self.registry.write();
        for _ in 0..Self::MAX_ID_ATTEMPTS {
            let id = generate_id(rng)?;
            if registry.subscribers.contains_key(&id) {
                warn!("Generated subscriber id {} is already live", id);
                continue;
            }
            let subscriber = Arc::new(Subscriber::with_id(id, policy));
            registry
                .subscribers
                .insert(subscriber.id().clone(), subscriber.clone());
            debug!("Subscriber {} added", subscriber.id());
            return Ok(subscriber);
        }
        Err(Error::IdentityGeneration(rand::Error::new(
            "no unused subscriber id after repeated attempts",
        )))
    }

    /// Unsubscribe `subscriber` from all its topics, drop it from the
    /// registry and then deactivate it.
    ///
    /// Deliveries dispatched before the removal may still land; nothing
    /// published afterwards will. Returns `false`, and leaves the handle
    /// untouched, if it is not registered with this broker.
    pub fn remove_subscriber(&self, subscriber: &Subscriber<T>) -> bool {
        {
            let mut registry = self.registry.write();
            if !registry.is_registered(subscriber) {
                return false;
            }
            for topic in subscriber.list_topics() {
                registry.unsubscribe(subscriber, &topic);
            }
            registry.subscribers.remove(subscriber.id());
        }
        // only after the subscriber is unreachable from any new snapshot
        subscriber.deactivate();
        debug!("Subscriber {} removed", subscriber.id());
        true
    }

    /// Subscribe `subscriber` to `topic`.
    ///
    /// Returns `Ok(false)` when it was already subscribed, and
    /// [`Error::UnknownSubscriber`] for handles this broker does not hold.
    pub fn subscribe(&self, subscriber: &Subscriber<T>, topic: &str) -> Result<bool> {
        let mut registry = self.registry.write();
        if !registry.is_registered(subscriber) {
            return Err(Error::UnknownSubscriber(subscriber.id().clone()));
        }
        let added = registry
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(subscriber.id().clone());
        subscriber.add_topic(topic);
        if added {
            debug!("{} subscribed to {}", subscriber.id(), topic);
        }
        Ok(added)
    }

    /// Unsubscribe `subscriber` from `topic`. No-op if it is not subscribed
    /// or not registered with this broker.
    pub fn unsubscribe(&self, subscriber: &Subscriber<T>, topic: &str) -> bool {
        let removed = {
            let mut registry = self.registry.write();
            registry.is_registered(subscriber) && registry.unsubscribe(subscriber, topic)
        };
        if removed {
            debug!("{} unsubscribed from {}", subscriber.id(), topic);
        }
        removed
    }

    /// Number of subscribers on `topic`; 0 for unknown topics.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .topics
            .get(topic)
            .map_or(0, Topic::len)
    }

    /// Sorted names of the topics that currently have subscribers.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.registry.read().topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Number of registered subscribers.
    pub fn subscriber_total(&self) -> usize {
        self.registry.read().subscribers.len()
    }

    pub fn subscriber(&self, id: &str) -> Option<Arc<Subscriber<T>>> {
        self.registry.read().subscribers.get(id).cloned()
    }

    /// Publish `payload` to every subscriber of `topic`.
    ///
    /// The subscriber set is snapshotted under the shared lock, which is
    /// released before delivery starts. Returns once every delivery has been
    /// handed off; await [`Dispatched::wait`] to learn the outcomes.
    pub async fn publish(&self, topic: &str, payload: T) -> Dispatched {
        self.published.fetch_add(1, Ordering::Relaxed);

        let targets = self.registry.read().snapshot(topic);
        if targets.is_empty() {
            debug!("No subscribers for topic '{}'", topic);
            return Dispatched::empty();
        }

        self.dispatched
            .fetch_add(targets.len() as u64, Ordering::Relaxed);
        let message = Arc::new(Message::new(topic, payload));
        self.dispatcher.dispatch(message, targets).await
    }

    pub fn stats(&self) -> BrokerStats {
        let registry = self.registry.read();
        BrokerStats {
            subscribers: registry.subscribers.len(),
            topics: registry.topics.len(),
            published: self.published.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Broker<T> {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Broker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("dispatcher", &self.dispatcher)
            .field("default_policy", &self.default_policy)
            .field("stats", &self.stats())
            .finish()
    }
}
