//! Topic index entries
//!
//! A `Topic` holds the ids of the subscribers registered under one topic
//! name. Duplicate subscriptions are a no-op.
//!
//! Concurrency note: a `Topic` is only ever touched through the broker's
//! registry lock, which also covers the subscriber map, so both sides of the
//! index change inside the same critical section.

use std::collections::HashSet;

use crate::subscriber::SubscriberId;

#[derive(Debug, Default)]
pub struct Topic {
    name: String,
    subscribers: HashSet<SubscriberId>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a subscriber to the topic. Returns `false` if it was already there.
    pub fn subscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.insert(id)
    }

    /// Remove a subscriber from the topic. Returns `false` if it was absent.
    pub fn unsubscribe(&mut self, id: &SubscriberId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.subscribers.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &SubscriberId> {
        self.subscribers.iter()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
