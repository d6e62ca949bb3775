//! Change notification bus
//!
//! Listeners subscribe to the collections they care about and receive a
//! [`ChangeEvent`] whenever a check cycle changes one of them. Publishing
//! also posts the event on a shared [`Channel`] so other processes using the
//! same store converge; [`Bus::relay`] feeds their events back to local
//! listeners without re-posting them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use miette::Result;
use serde::{Deserialize, Serialize};

use crate::core::reconcile::Diff;

/// A change to one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub diff: Diff,
}

/// Callback invoked with every event for a subscribed collection
pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Cross-process transport for change events
pub trait Channel {
    /// Make an event visible to other processes
    fn post(&mut self, event: &ChangeEvent) -> Result<()>;

    /// Events other processes posted since the last poll
    fn poll(&mut self) -> Result<Vec<ChangeEvent>>;
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// collection -> (subscription id, listener)
    by_collection: HashMap<String, Vec<(u64, Listener)>>,
}

impl Registry {
    /// Listeners interested in `collection`, each listener at most once
    fn interested(&self, collection: &str) -> Vec<Listener> {
        let mut seen = HashSet::new();
        self.by_collection
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|(_, listener)| seen.insert(Arc::as_ptr(listener) as *const () as usize))
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// Handle returned by [`Bus::subscribe`]
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    collections: BTreeSet<String>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the interest registered by this subscription
    ///
    /// Interest the same listener registered through other subscriptions is
    /// left in place.
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        for collection in &self.collections {
            if let Some(entries) = registry.by_collection.get_mut(collection) {
                entries.retain(|(id, _)| *id != self.id);
                if entries.is_empty() {
                    registry.by_collection.remove(collection);
                }
            }
        }
    }
}

/// In-process subscription registry with an optional cross-process channel
pub struct Bus {
    registry: Arc<Mutex<Registry>>,
    channel: Option<Box<dyn Channel>>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Bus that only notifies listeners in this process
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            channel: None,
        }
    }

    /// Bus that also shares events over `channel`
    pub fn with_channel(channel: impl Channel + 'static) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            channel: Some(Box::new(channel)),
        }
    }

    /// Register `listener` for changes to `collections`
    ///
    /// Calling this again with the same listener adds to its interest; a
    /// listener subscribed to a collection twice is still called once per
    /// event.
    pub fn subscribe<I, S>(&self, collections: I, listener: Listener) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collections: BTreeSet<String> = collections.into_iter().map(Into::into).collect();

        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        for collection in &collections {
            registry
                .by_collection
                .entry(collection.clone())
                .or_default()
                .push((id, Arc::clone(&listener)));
        }

        Subscription {
            id,
            collections,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Notify local listeners and post the event to other processes
    ///
    /// Events with an empty diff are dropped. A failure to post is logged and
    /// does not affect local delivery.
    pub fn publish(&mut self, event: ChangeEvent) {
        if event.diff.is_empty() {
            return;
        }

        self.dispatch(&event);

        if let Some(channel) = self.channel.as_mut() {
            if let Err(e) = channel.post(&event) {
                tracing::warn!(
                    "failed to share changes of \"{}\" with other processes: {}",
                    event.collection,
                    e
                );
            }
        }
    }

    /// Deliver events posted by other processes to local listeners
    ///
    /// Returns the number of events received.
    pub fn relay(&mut self) -> Result<usize> {
        let Some(channel) = self.channel.as_mut() else {
            return Ok(0);
        };

        let events = channel.poll()?;
        for event in &events {
            if !event.diff.is_empty() {
                self.dispatch(event);
            }
        }

        Ok(events.len())
    }

    fn dispatch(&self, event: &ChangeEvent) {
        // Call listeners outside the lock so they may subscribe or unsubscribe
        let listeners = lock(&self.registry).interested(&event.collection);
        for listener in listeners {
            listener(event);
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}
